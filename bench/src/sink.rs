use crate::unit::UnitProgress;
use std::fmt::Debug;
use tracing::info;

/// Receiver for "unit fully completed" events.
///
/// Called once for every ingestion that covered the 100% frame of a unit, a
/// re-poll of the same range calls it again. De-duplication is up to the sink.
pub trait CompletedUnitSink: Send + Sync + Debug {
    fn record_completed_unit(&self, unit: &dyn UnitProgress);
}

/// Sink that only logs completed units
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl CompletedUnitSink for LogSink {
    fn record_completed_unit(&self, unit: &dyn UnitProgress) {
        info!(
            owner = unit.owner_name(),
            path = unit.owner_path(),
            project = unit.project_id(),
            "Unit completed"
        );
    }
}
