// Pipeline ingestion: extractor output into candidate records

pub mod candidate_line;

pub use candidate_line::{parse_line, read_candidates, IngestBatch};
