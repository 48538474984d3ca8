//! Pluggable span lifecycle observers and the recording observer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::identity::{SpanId, TraceId};
use crate::record::{
    Annotation, BinaryAnnotation, Endpoint, SpanRecord, CLIENT_RECV, CLIENT_SEND, LOCAL_COMPONENT,
    SERVER_RECV, SERVER_SEND,
};
use crate::recorder::Recorder;
use crate::span::{Span, SpanKind, TagValue};

/// A listener attached to a span's lifecycle events.
///
/// All members are optional and default to no-ops, so implementations
/// attach only what they need. Dispatch happens in registration order on
/// the one execution unit that owns the span, so no internal
/// synchronization is required here; observers that mutate state shared
/// across spans or requests must synchronize that state themselves.
///
/// The dispatch loop does not guard against observer panics: a panicking
/// observer aborts dispatch to the remaining observers for that call and
/// unwinds into request handling. Observers must be written defensively;
/// this is a documented contract, not a bug.
pub trait SpanObserver: Send + std::fmt::Debug {
    /// The span began timing.
    fn on_start(&mut self) {}

    /// A tag was attached to the span.
    fn on_set_tag(&mut self, _key: &str, _value: &TagValue) {}

    /// A counter tag was incremented by `delta`.
    fn on_incr_tag(&mut self, _key: &str, _delta: i64) {}

    /// An instantaneous event was recorded on the span.
    fn on_log(&mut self, _name: &str, _payload: &str) {}

    /// The span finished, possibly with error information.
    fn on_finish(&mut self, _error: Option<&(dyn std::error::Error + 'static)>) {}

    /// The span created a child. Attach an observer to `child` here to
    /// follow the tree down.
    fn on_child_span_created(&mut self, _child: &mut Span) {}
}

/// The observer that turns finished spans into [`SpanRecord`]s.
///
/// Attached by the tracer to each sampled server span, it snapshots the
/// span's identity, accumulates tags and counter sums over the span's life,
/// serializes on finish, and hands the record to the process-wide
/// [`Recorder`]. It re-attaches itself to every child span it is told
/// about, which is how recording follows the request tree.
#[derive(Debug)]
pub struct TracingObserver {
    recorder: Arc<dyn Recorder>,
    endpoint: Endpoint,
    trace_id: TraceId,
    span_id: SpanId,
    parent_id: Option<SpanId>,
    name: String,
    kind: SpanKind,
    component_name: Option<String>,
    start: Option<(u64, Instant)>,
    tags: Vec<(String, String)>,
    counters: BTreeMap<String, i64>,
}

impl TracingObserver {
    /// Create an observer recording the given span.
    pub fn new(recorder: Arc<dyn Recorder>, endpoint: Endpoint, span: &Span) -> Self {
        TracingObserver {
            recorder,
            endpoint,
            trace_id: span.trace_id(),
            span_id: span.span_id(),
            parent_id: span.parent_id(),
            name: span.name().to_owned(),
            kind: span.kind(),
            component_name: span.component_name().map(str::to_owned),
            start: None,
            tags: Vec::new(),
            counters: BTreeMap::new(),
        }
    }

    fn make_record(&self, failed: bool) -> SpanRecord {
        // A span finished without ever starting violates the lifecycle
        // contract; emit a zero-duration record rather than dropping it.
        let (start_us, duration_us) = match self.start {
            Some((wall_us, started)) => (wall_us, started.elapsed().as_micros() as u64),
            None => (epoch_micros(), 0),
        };
        let end_us = start_us + duration_us;

        let mut annotations = Vec::new();
        match self.kind {
            SpanKind::Server => {
                annotations.push(self.annotation(SERVER_RECV, start_us));
                annotations.push(self.annotation(SERVER_SEND, end_us));
            }
            SpanKind::Client => {
                annotations.push(self.annotation(CLIENT_SEND, start_us));
                annotations.push(self.annotation(CLIENT_RECV, end_us));
            }
            SpanKind::Local => {}
        }

        let mut binary_annotations = Vec::with_capacity(self.tags.len() + self.counters.len() + 2);
        if let (SpanKind::Local, Some(component)) = (self.kind, self.component_name.as_deref()) {
            binary_annotations.push(self.binary_annotation(LOCAL_COMPONENT, component));
        }
        for (key, value) in &self.tags {
            binary_annotations.push(self.binary_annotation(key, value));
        }
        // Counter tags emit one final summed entry per key.
        for (key, sum) in &self.counters {
            binary_annotations.push(self.binary_annotation(key, &sum.to_string()));
        }
        if failed {
            binary_annotations.push(self.binary_annotation("error", "true"));
        }

        SpanRecord::builder()
            .trace_id(self.trace_id.to_u64())
            .name(self.name.clone())
            .id(self.span_id.to_u64())
            .parent_id(self.parent_id.map(SpanId::to_u64).unwrap_or(0))
            .timestamp(start_us)
            .duration(duration_us)
            .annotations(annotations)
            .binary_annotations(binary_annotations)
            .build()
    }

    fn annotation(&self, value: &str, timestamp: u64) -> Annotation {
        Annotation::builder()
            .endpoint(self.endpoint.clone())
            .timestamp(timestamp)
            .value(value)
            .build()
    }

    fn binary_annotation(&self, key: &str, value: &str) -> BinaryAnnotation {
        BinaryAnnotation::builder()
            .key(key)
            .value(value)
            .endpoint(self.endpoint.clone())
            .build()
    }
}

impl SpanObserver for TracingObserver {
    fn on_start(&mut self) {
        self.start = Some((epoch_micros(), Instant::now()));
    }

    fn on_set_tag(&mut self, key: &str, value: &TagValue) {
        self.tags.push((key.to_owned(), value.to_string()));
    }

    fn on_incr_tag(&mut self, key: &str, delta: i64) {
        *self.counters.entry(key.to_owned()).or_insert(0) += delta;
    }

    fn on_finish(&mut self, error: Option<&(dyn std::error::Error + 'static)>) {
        let record = self.make_record(error.is_some());
        self.recorder.send(record);
    }

    fn on_child_span_created(&mut self, child: &mut Span) {
        child.register(Box::new(TracingObserver::new(
            Arc::clone(&self.recorder),
            self.endpoint.clone(),
            child,
        )));
    }
}

fn epoch_micros() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TraceIdentity;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    /// Recorder that captures records synchronously.
    #[derive(Debug, Default)]
    struct CapturingRecorder {
        records: Mutex<Vec<SpanRecord>>,
    }

    impl Recorder for CapturingRecorder {
        fn send(&self, record: SpanRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    fn test_endpoint() -> Endpoint {
        Endpoint::new("test-service", Ipv4Addr::new(127, 0, 0, 1))
    }

    fn observed_span(kind: SpanKind, component: Option<&str>) -> (Span, Arc<CapturingRecorder>) {
        let recorder = Arc::new(CapturingRecorder::default());
        let mut span = Span::new(
            TraceIdentity::new(),
            "test".to_owned(),
            kind,
            component.map(str::to_owned),
            true,
        );
        let observer = TracingObserver::new(
            Arc::clone(&recorder) as Arc<dyn Recorder>,
            test_endpoint(),
            &span,
        );
        span.register(Box::new(observer));
        (span, recorder)
    }

    fn finished_record(mut span: Span, recorder: &CapturingRecorder) -> SpanRecord {
        span.start();
        span.finish(None);
        recorder.records.lock().unwrap().pop().unwrap()
    }

    #[test]
    fn server_span_serializes_receive_send_pair() {
        let (span, recorder) = observed_span(SpanKind::Server, None);
        let record = finished_record(span, &recorder);

        let values: Vec<&str> = record.annotations().iter().map(|a| a.value()).collect();
        assert_eq!(values, vec![SERVER_RECV, SERVER_SEND]);
        assert_eq!(record.parent_id(), 0);
        assert!(record.annotations()[1].timestamp() >= record.annotations()[0].timestamp());
    }

    #[test]
    fn client_span_serializes_send_receive_pair() {
        let (mut root, recorder) = observed_span(SpanKind::Server, None);
        let span = root.make_child("test.rpc", false, None);
        let record = finished_record(span, &recorder);

        let values: Vec<&str> = record.annotations().iter().map(|a| a.value()).collect();
        assert_eq!(values, vec![CLIENT_SEND, CLIENT_RECV]);
        assert_ne!(record.parent_id(), 0);
    }

    #[test]
    fn local_span_tags_its_component() {
        let (mut root, recorder) = observed_span(SpanKind::Server, None);
        let span = root.make_child("work", true, Some("biz"));
        let record = finished_record(span, &recorder);

        assert!(record.annotations().is_empty());
        let lc = &record.binary_annotations()[0];
        assert_eq!(lc.key(), LOCAL_COMPONENT);
        assert_eq!(lc.value(), "biz");
    }

    #[test]
    fn counter_tags_emit_one_summed_entry() {
        let (mut span, recorder) = observed_span(SpanKind::Server, None);
        span.start();
        span.incr_tag("x", 3);
        span.incr_tag("x", 2);
        span.finish(None);

        let record = recorder.records.lock().unwrap().pop().unwrap();
        let xs: Vec<&str> = record
            .binary_annotations()
            .iter()
            .filter(|b| b.key() == "x")
            .map(|b| b.value())
            .collect();
        assert_eq!(xs, vec!["5"]);
    }

    #[test]
    fn tag_values_are_coerced_to_strings() {
        let (mut span, recorder) = observed_span(SpanKind::Server, None);
        span.start();
        span.set_tag("flag", true);
        span.set_tag("count", 7i64);
        span.set_tag("label", "plain");
        span.finish(None);

        let record = recorder.records.lock().unwrap().pop().unwrap();
        let tags: Vec<(&str, &str)> = record
            .binary_annotations()
            .iter()
            .map(|b| (b.key(), b.value()))
            .collect();
        assert_eq!(
            tags,
            vec![("flag", "true"), ("count", "7"), ("label", "plain")]
        );
    }

    #[test]
    fn failed_finish_adds_error_tag() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;

        let (mut span, recorder) = observed_span(SpanKind::Server, None);
        span.start();
        span.finish(Some(&Boom));

        let record = recorder.records.lock().unwrap().pop().unwrap();
        assert!(record
            .binary_annotations()
            .iter()
            .any(|b| b.key() == "error" && b.value() == "true"));
    }

    #[test]
    fn observer_follows_children_down_the_tree() {
        let (mut root, recorder) = observed_span(SpanKind::Server, None);
        let mut child = root.make_child("work", true, Some("biz"));
        assert_eq!(child.observer_count(), 1);
        let mut grandchild = child.make_child("work.rpc", false, None);
        assert_eq!(grandchild.observer_count(), 1);

        grandchild.start();
        grandchild.finish(None);
        child.start();
        child.finish(None);
        root.start();
        root.finish(None);

        let records = recorder.records.lock().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.trace_id() == records[0].trace_id()));
    }
}
