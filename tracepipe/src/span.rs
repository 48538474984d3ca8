//! Span tree nodes and lifecycle dispatch.
//!
//! A span is a timed node representing one unit of request-processing work.
//! Spans form a per-request tree: an inbound request creates a server span,
//! and application code creates child spans via [`Span::make_child`]. Every
//! lifecycle call fans out to the span's registered observers in
//! registration order; the span itself knows nothing about what those
//! observers do.
//!
//! A span is owned and mutated by the single execution unit handling its
//! request and must never be shared across concurrent units.

use std::fmt;

use crate::identity::{SpanId, TraceFlags, TraceId, TraceIdentity};
use crate::observer::SpanObserver;

/// The role a span plays in its trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// The root span of a trace, representing an inbound request.
    Server,
    /// A span representing an outbound call to another service.
    Client,
    /// A span representing in-process component work, not a network
    /// boundary.
    Local,
}

/// A tag value, coerced to its canonical string form at serialization.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    /// Renders as lowercase `"true"` / `"false"`.
    Bool(bool),
    /// A signed integer value.
    I64(i64),
    /// A floating point value.
    F64(f64),
    /// A string value, passed through unchanged.
    String(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(v) => v.fmt(f),
            TagValue::I64(v) => v.fmt(f),
            TagValue::F64(v) => v.fmt(f),
            TagValue::String(v) => v.fmt(f),
        }
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::I64(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::I64(value.into())
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::F64(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::String(value.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::String(value)
    }
}

/// A single node in a request's span tree.
///
/// Lifecycle: created by its owner, [`start`]ed once, tagged and logged
/// zero or more times, then [`finish`]ed exactly once. Double-start or
/// double-finish is a caller contract violation and is not guarded at
/// runtime.
///
/// [`start`]: Span::start
/// [`finish`]: Span::finish
#[derive(Debug)]
pub struct Span {
    identity: TraceIdentity,
    name: String,
    kind: SpanKind,
    component_name: Option<String>,
    sampled: bool,
    observers: Vec<Box<dyn SpanObserver>>,
}

impl Span {
    pub(crate) fn new(
        mut identity: TraceIdentity,
        name: String,
        kind: SpanKind,
        component_name: Option<String>,
        sampled: bool,
    ) -> Self {
        identity.set_sampled(sampled);
        Span {
            identity,
            name,
            kind,
            component_name,
            sampled,
            observers: Vec::new(),
        }
    }

    /// The trace id shared by this span's whole subtree.
    pub fn trace_id(&self) -> TraceId {
        self.identity.trace_id()
    }

    /// The creating span's id, `None` for a root span.
    pub fn parent_id(&self) -> Option<SpanId> {
        self.identity.parent_id()
    }

    /// This span's own id.
    pub fn span_id(&self) -> SpanId {
        self.identity.span_id()
    }

    /// The propagated trace flags.
    pub fn flags(&self) -> TraceFlags {
        self.identity.flags()
    }

    /// This span's identity, with the resolved sampling decision.
    pub fn identity(&self) -> &TraceIdentity {
        &self.identity
    }

    /// The span's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The role this span plays in its trace.
    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    /// The component name of a local span.
    pub fn component_name(&self) -> Option<&str> {
        self.component_name.as_deref()
    }

    /// The sampling decision inherited by this span's subtree.
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Append an observer to this span's dispatch list.
    pub fn register(&mut self, observer: Box<dyn SpanObserver>) {
        self.observers.push(observer);
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Begin timing the span and notify observers.
    pub fn start(&mut self) {
        for observer in &mut self.observers {
            observer.on_start();
        }
    }

    /// Attach a tag to the span.
    pub fn set_tag(&mut self, key: &str, value: impl Into<TagValue>) {
        let value = value.into();
        for observer in &mut self.observers {
            observer.on_set_tag(key, &value);
        }
    }

    /// Add `delta` to the running sum for a counter tag.
    ///
    /// Counter tags accumulate over the span's life and serialize as a
    /// single final tag per key.
    pub fn incr_tag(&mut self, key: &str, delta: i64) {
        for observer in &mut self.observers {
            observer.on_incr_tag(key, delta);
        }
    }

    /// Record an instantaneous event on the span.
    pub fn log(&mut self, name: &str, payload: &str) {
        for observer in &mut self.observers {
            observer.on_log(name, payload);
        }
    }

    /// Finish the span, notifying observers and then releasing them.
    ///
    /// Passing error information marks the span as failed for observers
    /// that care. After this call the span holds no observers, so nothing
    /// outlives its usefulness; dropping the span is plain teardown.
    pub fn finish(&mut self, error: Option<&(dyn std::error::Error + 'static)>) {
        for observer in &mut self.observers {
            observer.on_finish(error);
        }
        self.observers.clear();
    }

    /// Create a child span.
    ///
    /// The child shares this span's trace id and flags, gets a fresh random
    /// span id, a parent id equal to this span's id, and inherits the
    /// sampling decision. `local` selects [`SpanKind::Local`] (in-process
    /// component work, tagged with `component_name`) over
    /// [`SpanKind::Client`] (an outbound call).
    ///
    /// Only the observers currently registered on this span are notified of
    /// the child; each decides independently whether to attach its own
    /// observer to it. This is how recording, metrics, and resilience
    /// concerns propagate down an arbitrarily deep tree without the span
    /// system knowing about any of them.
    pub fn make_child(
        &mut self,
        name: impl Into<String>,
        local: bool,
        component_name: Option<&str>,
    ) -> Span {
        let kind = if local {
            SpanKind::Local
        } else {
            SpanKind::Client
        };
        let mut child = Span::new(
            self.identity.child(),
            name.into(),
            kind,
            component_name.map(str::to_owned),
            self.sampled,
        );
        for observer in &mut self.observers {
            observer.on_child_span_created(&mut child);
        }
        child
    }

    /// Run `f` within the span's lifecycle: the span is started on entry
    /// and finished on exit, with an `Err` from `f` captured and passed to
    /// [`finish`](Span::finish) automatically.
    pub fn scoped<T, E, F>(mut self, f: F) -> Result<T, E>
    where
        E: std::error::Error + 'static,
        F: FnOnce(&mut Span) -> Result<T, E>,
    {
        self.start();
        let result = f(&mut self);
        match &result {
            Ok(_) => self.finish(None),
            Err(error) => self.finish(Some(error)),
        }
        result
    }
}
