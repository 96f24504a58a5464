// Data processing pipeline: candidate storage and processing stages

pub mod ingestion;
pub mod processing;
pub mod storage;

pub use processing::clustering::{Clusterer, IncidentCluster};
pub use processing::reconcile::{FieldPrecedence, Reconciler};
pub use processing::similarity::{SimilarityScorer, WeightedScorer};
pub use processing::validate::Validator;
pub use storage::CandidateStore;
