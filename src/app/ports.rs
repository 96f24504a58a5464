use async_trait::async_trait;

use crate::app::report::LedgerReport;
use crate::domain::Coordinates;

/// Place-name oracle. `Ok(None)` means the place is unknown; an `Err` or a
/// timeout means the oracle is unavailable for this lookup.
#[async_trait]
pub trait GazetteerPort: Send + Sync {
    async fn centroid(&self, place: &str) -> anyhow::Result<Option<Coordinates>>;
}

/// Destination for a finished run. Nothing is written unless the whole
/// report was built.
#[async_trait]
pub trait ReportOutputPort: Send + Sync {
    async fn write_report(&self, report: &LedgerReport) -> anyhow::Result<()>;
}
