//! In-memory sink for testing.

use std::sync::{Arc, Mutex};

use crate::error::TraceResult;
use crate::record::SpanRecord;
use crate::recorder::{RecordExporter, Recorder};

/// Sink that stores records in memory for inspection by tests.
///
/// Implements both [`RecordExporter`] (to sit behind the batch pipeline)
/// and [`Recorder`] (for synchronous, pipeline-free tests). Clones share
/// the same underlying storage.
///
/// ```
/// use tracepipe::recorder::{BatchRecorder, InMemoryRecordExporter, Recorder};
/// use tracepipe::BatchConfig;
///
/// let exporter = InMemoryRecordExporter::new();
/// let recorder = BatchRecorder::new(exporter.clone(), BatchConfig::default());
/// // ... finish spans ...
/// recorder.shutdown().unwrap();
/// let records = exporter.get_finished_records().unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecordExporter {
    records: Arc<Mutex<Vec<SpanRecord>>>,
}

impl InMemoryRecordExporter {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        InMemoryRecordExporter::default()
    }

    /// All records received so far.
    pub fn get_finished_records(&self) -> TraceResult<Vec<SpanRecord>> {
        self.records
            .lock()
            .map(|records| records.clone())
            .map_err(Into::into)
    }

    /// Clear the stored records.
    pub fn reset(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl RecordExporter for InMemoryRecordExporter {
    fn export(&self, batch: Vec<SpanRecord>) -> TraceResult<()> {
        self.records
            .lock()
            .map(|mut records| records.extend(batch))
            .map_err(Into::into)
    }
}

impl Recorder for InMemoryRecordExporter {
    fn send(&self, record: SpanRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
