pub mod ledger_use_case;
pub mod ports;
pub mod report;

pub use ledger_use_case::LedgerUseCase;
pub use report::{LedgerReport, RunStats};
