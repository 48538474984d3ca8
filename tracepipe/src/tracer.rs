//! Entry point tying identity, sampling, and recording together.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::error::TraceResult;
use crate::identity::TraceIdentity;
use crate::observer::TracingObserver;
use crate::record::Endpoint;
use crate::recorder::{NoopRecorder, Recorder};
use crate::sampler::Sampler;
use crate::span::{Span, SpanKind};

/// Default service name if no service is configured.
const DEFAULT_SERVICE_NAME: &str = "unknown-service";

/// Default fraction of traces recorded when no rate is configured.
const DEFAULT_SAMPLE_RATE: f64 = 0.1;

/// The process-wide tracing component.
///
/// Built once at startup and shared read-mostly across all requests, the
/// tracer creates server spans from trace identity, makes the once-per-trace
/// sampling decision, and attaches the recording observer to sampled spans.
#[derive(Clone, Debug)]
pub struct Tracer {
    endpoint: Endpoint,
    sampler: Sampler,
    recorder: Arc<dyn Recorder>,
}

impl Tracer {
    /// Start building a tracer.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Create the root span for an inbound request.
    ///
    /// Resolves the sampling decision exactly once here; the whole subtree
    /// created through [`Span::make_child`] inherits it. When the span is
    /// sampled, a recording observer is attached that serializes it on
    /// finish and hands the record to this tracer's recorder.
    pub fn make_server_span(&self, name: impl Into<String>, identity: TraceIdentity) -> Span {
        let sampled = self.sampler.should_sample(&identity);
        let mut span = Span::new(identity, name.into(), SpanKind::Server, None, sampled);
        if sampled {
            let observer = TracingObserver::new(
                Arc::clone(&self.recorder),
                self.endpoint.clone(),
                &span,
            );
            span.register(Box::new(observer));
        }
        span
    }

    /// The recorder this tracer reports to.
    pub fn recorder(&self) -> &Arc<dyn Recorder> {
        &self.recorder
    }

    /// Shut down the underlying recorder.
    pub fn shutdown(&self) -> TraceResult<()> {
        self.recorder.shutdown()
    }
}

/// Builder for [`Tracer`] instances.
#[derive(Debug)]
pub struct TracerBuilder {
    service_name: String,
    ip: Ipv4Addr,
    sample_rate: f64,
    recorder: Option<Arc<dyn Recorder>>,
}

impl Default for TracerBuilder {
    fn default() -> Self {
        TracerBuilder {
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            ip: Ipv4Addr::UNSPECIFIED,
            sample_rate: DEFAULT_SAMPLE_RATE,
            recorder: None,
        }
    }
}

impl TracerBuilder {
    /// Set the service name records are reported under.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the address records are reported from.
    pub fn with_ip(mut self, ip: Ipv4Addr) -> Self {
        self.ip = ip;
        self
    }

    /// Set the fraction of traces to record, in `[0.0, 1.0]`.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the recorder finished spans are shipped to.
    ///
    /// Defaults to [`NoopRecorder`], the discard strategy.
    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Build the tracer.
    pub fn build(self) -> Tracer {
        Tracer {
            endpoint: Endpoint::new(self.service_name, self.ip),
            sampler: Sampler::new(self.sample_rate),
            recorder: self
                .recorder
                .unwrap_or_else(|| Arc::new(NoopRecorder::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::InMemoryRecordExporter;

    #[test]
    fn unsampled_server_spans_carry_no_observer() {
        let tracer = Tracer::builder().with_sample_rate(0.0).build();
        let span = tracer.make_server_span("svc.endpoint", TraceIdentity::new());
        assert!(!span.is_sampled());
        assert_eq!(span.observer_count(), 0);
    }

    #[test]
    fn sampled_server_spans_record_on_finish() {
        let sink = Arc::new(InMemoryRecordExporter::new());
        let tracer = Tracer::builder()
            .with_service_name("svc")
            .with_sample_rate(1.0)
            .with_recorder(Arc::clone(&sink) as Arc<dyn Recorder>)
            .build();

        let mut span = tracer.make_server_span("svc.endpoint", TraceIdentity::new());
        assert!(span.is_sampled());
        assert_eq!(span.observer_count(), 1);
        span.start();
        span.finish(None);

        let records = sink.get_finished_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "svc.endpoint");
        assert_eq!(records[0].parent_id(), 0);
    }

    #[test]
    fn default_recorder_discards() {
        let tracer = Tracer::builder().with_sample_rate(1.0).build();
        let mut span = tracer.make_server_span("svc.endpoint", TraceIdentity::new());
        span.start();
        span.finish(None);
        tracer.shutdown().unwrap();
    }
}
