//! Remote-batch recorder shipping span records to a Zipkin v1 collector.
//!
//! Records are serialized to a JSON array and POSTed over a pooled
//! keep-alive HTTP connection to `<collector>/api/v1/spans`, via the
//! `tracepipe` batching pipeline. Each flush carries its own short timeout;
//! on failure (network error, non-2xx) the batch is logged and discarded;
//! delivery is best-effort and there is no retry.
//!
//! # Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracepipe::Tracer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let recorder = tracepipe_zipkin::new_pipeline()
//!         .with_collector_endpoint("http://127.0.0.1:9411/api/v1/spans")
//!         .build()?;
//!
//!     let tracer = Tracer::builder()
//!         .with_service_name("my-service")
//!         .with_sample_rate(0.1)
//!         .with_recorder(Arc::new(recorder))
//!         .build();
//!     // ... serve requests, then on process teardown:
//!     tracer.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! HTTPS collectors need the `native-tls` or `rustls` feature; the default
//! build speaks plaintext HTTP only.

#![warn(missing_docs, missing_debug_implementations)]

mod uploader;

use std::time::Duration;

use thiserror::Error;

use tracepipe::error::{TraceError, TraceResult};
use tracepipe::record::SpanRecord;
use tracepipe::recorder::{BatchConfig, BatchRecorder, RecordExporter};

/// Default Zipkin collector endpoint.
const DEFAULT_COLLECTOR_ENDPOINT: &str = "http://127.0.0.1:9411/api/v1/spans";

/// Default per-flush request timeout.
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Zipkin record exporter.
///
/// Usually wrapped in a [`BatchRecorder`] by [`ZipkinPipelineBuilder::build`];
/// exposed for callers that want to drive flushing themselves.
#[derive(Debug)]
pub struct Exporter {
    uploader: uploader::Uploader,
}

impl Exporter {
    fn new(uploader: uploader::Uploader) -> Self {
        Exporter { uploader }
    }
}

impl RecordExporter for Exporter {
    fn export(&self, batch: Vec<SpanRecord>) -> TraceResult<()> {
        self.uploader
            .upload(batch)
            .map_err(|err| TraceError::ExportFailed(Box::new(err)))
    }
}

/// Create a new Zipkin recorder pipeline builder.
pub fn new_pipeline() -> ZipkinPipelineBuilder {
    ZipkinPipelineBuilder::default()
}

/// Builder for the Zipkin recorder.
#[derive(Debug)]
pub struct ZipkinPipelineBuilder {
    collector_endpoint: String,
    flush_timeout: Duration,
    batch_config: Option<BatchConfig>,
}

impl Default for ZipkinPipelineBuilder {
    fn default() -> Self {
        ZipkinPipelineBuilder {
            collector_endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            batch_config: None,
        }
    }
}

impl ZipkinPipelineBuilder {
    /// Assign the full collector endpoint URL, including the
    /// `/api/v1/spans` path.
    pub fn with_collector_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.collector_endpoint = endpoint.into();
        self
    }

    /// Assign the per-flush request timeout.
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Assign the batching pipeline configuration.
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.batch_config = Some(config);
        self
    }

    /// Build the exporter without the batching pipeline around it.
    pub fn build_exporter(self) -> Result<Exporter, Error> {
        let endpoint = reqwest::Url::parse(&self.collector_endpoint)
            .map_err(|_| Error::InvalidUri(self.collector_endpoint.clone()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(self.flush_timeout)
            .build()?;
        Ok(Exporter::new(uploader::Uploader::new(client, endpoint)))
    }

    /// Build a ready [`BatchRecorder`] shipping to the collector.
    pub fn build(self) -> Result<BatchRecorder, Error> {
        let batch_config = self.batch_config.clone().unwrap_or_default();
        let exporter = self.build_exporter()?;
        Ok(BatchRecorder::new(exporter, batch_config))
    }
}

/// Errors from constructing or running the Zipkin recorder.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configured collector endpoint is not a valid URL.
    #[error("invalid collector endpoint `{0}`")]
    InvalidUri(String),

    /// The HTTP request failed or the collector returned a non-2xx status.
    #[error("http request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}
