// Pipeline processing: similarity, clustering, reconciliation and validation

pub mod normalize;
pub mod similarity;
pub mod clustering;
pub mod geo;
pub mod reconcile;
pub mod validate;
pub mod confidence;
pub mod quality;
