// Run-scoped storage for admitted candidates

pub mod candidate_store;

pub use candidate_store::{CandidateStore, Rejection, RejectionReason};
