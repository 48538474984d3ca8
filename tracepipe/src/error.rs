//! Errors shared across the recording pipeline.

use std::sync::PoisonError;

use thiserror::Error;

/// A specialized `Result` type for recording operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors raised inside the recording pipeline.
///
/// None of these ever reach request-handling code: every variant is caught
/// and logged at the recorder boundary. They surface only through the
/// control-plane operations (`shutdown`, sink construction) that a process
/// calls at startup or teardown.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// A sink rejected a batch of records.
    #[error("export failed: {0}")]
    ExportFailed(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The recorder was already shut down.
    #[error("recorder already shut down")]
    AlreadyShutdown,

    /// The sidecar channel could not be opened.
    #[error("sidecar channel unavailable: {0}")]
    SidecarUnavailable(#[source] std::io::Error),

    /// Other errors not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(err_msg)
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(err_msg.to_owned())
    }
}

impl<T> From<PoisonError<T>> for TraceError {
    fn from(err: PoisonError<T>) -> Self {
        TraceError::Other(err.to_string())
    }
}
