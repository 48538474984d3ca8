//! A sink that emits records into the process log.

use tracing::{debug, warn};

use crate::error::TraceResult;
use crate::record::SpanRecord;
use crate::recorder::{BatchConfig, BatchRecorder, RecordExporter};

/// Exporter that writes each record, serialized, at debug severity.
#[derive(Debug, Default)]
pub struct LogExporter {
    _private: (),
}

impl LogExporter {
    /// Create a new log exporter.
    pub fn new() -> Self {
        LogExporter::default()
    }
}

impl RecordExporter for LogExporter {
    fn export(&self, batch: Vec<SpanRecord>) -> TraceResult<()> {
        for record in batch {
            match serde_json::to_string(&record) {
                Ok(json) => debug!(span = %json, "span record"),
                Err(error) => warn!(%error, "failed to serialize span record"),
            }
        }
        Ok(())
    }
}

/// Create a recorder that logs records at debug severity through the
/// batching pipeline.
pub fn new_log_recorder(config: BatchConfig) -> BatchRecorder {
    BatchRecorder::new(LogExporter::new(), config)
}
