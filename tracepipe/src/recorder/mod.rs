//! Recording sinks for serialized span records.
//!
//! A [`Recorder`] is the process-wide sink the recording observer hands
//! finished spans to. It is constructed once at startup, shared read-mostly
//! across all requests, and must never block the request path beyond a
//! bounded enqueue attempt nor propagate an error to it. Delivery is
//! best-effort, at-most-once: under pressure records are dropped, never the
//! request.
//!
//! Built-in strategies:
//!
//! - [`NoopRecorder`]: discard everything.
//! - [`new_log_recorder`]: emit each record at debug severity, via the
//!   batch pipeline.
//! - [`BatchRecorder`] over a remote exporter (see the `tracepipe-zipkin`
//!   crate): batch and POST to a collector.
//! - [`SidecarRecorder`]: per-record hand-off to an out-of-process
//!   shipping agent over a bounded IPC channel.

use std::fmt;

use crate::error::TraceResult;
use crate::record::SpanRecord;

mod batch;
#[cfg(any(test, feature = "testing"))]
mod in_memory;
mod log;
#[cfg(unix)]
mod sidecar;

pub use batch::{BatchConfig, BatchConfigBuilder, BatchRecorder};
#[cfg(any(test, feature = "testing"))]
pub use in_memory::InMemoryRecordExporter;
pub use log::{new_log_recorder, LogExporter};
#[cfg(unix)]
pub use sidecar::{SidecarRecorder, MAX_SIDECAR_MESSAGE_SIZE};

/// The sink abstraction accepting serialized span records.
pub trait Recorder: Send + Sync + fmt::Debug {
    /// Accept one finished span record.
    ///
    /// This is called on the request path and must return quickly: at most
    /// a non-blocking or short-timeout enqueue attempt. Failures are
    /// handled (logged, record dropped) inside the recorder and never
    /// surfaced to the caller.
    fn send(&self, record: SpanRecord);

    /// Release any resources held by the recorder.
    ///
    /// Records still buffered at shutdown may be lost; delivery is
    /// best-effort.
    fn shutdown(&self) -> TraceResult<()> {
        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Default)]
pub struct NoopRecorder {
    _private: (),
}

impl NoopRecorder {
    /// Create a new no-op recorder.
    pub fn new() -> Self {
        NoopRecorder::default()
    }
}

impl Recorder for NoopRecorder {
    fn send(&self, _record: SpanRecord) {}
}

/// A sink that batches of records are flushed to by the pipeline workers.
///
/// `export` runs on a background worker, so unlike [`Recorder::send`] it
/// may block for the duration of a (short, bounded) flush. Errors are
/// logged by the pipeline and the batch is discarded; there is no retry.
pub trait RecordExporter: Send + Sync + fmt::Debug + 'static {
    /// Flush one batch of records to the sink.
    fn export(&self, batch: Vec<SpanRecord>) -> TraceResult<()>;

    /// Release any resources held by the exporter.
    fn shutdown(&self) {}
}
