//! The canonical wire form of a finished span.
//!
//! Records serialize to the Zipkin v1 JSON span shape: numeric 64-bit ids,
//! microsecond timestamps, instant annotations for protocol milestones, and
//! binary annotations for tags. `parentId` serializes as `0` for a root span
//! rather than an absent field, for wire-format compatibility.

use std::net::Ipv4Addr;

use serde::Serialize;
use typed_builder::TypedBuilder;

/// Annotation value marking the instant a server received a request.
pub const SERVER_RECV: &str = "sr";
/// Annotation value marking the instant a server sent its response.
pub const SERVER_SEND: &str = "ss";
/// Annotation value marking the instant a client sent a request.
pub const CLIENT_SEND: &str = "cs";
/// Annotation value marking the instant a client received a response.
pub const CLIENT_RECV: &str = "cr";
/// Binary annotation key identifying the component of a local span.
pub const LOCAL_COMPONENT: &str = "lc";

/// The network endpoint a record was reported from.
#[derive(TypedBuilder, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[builder(setter(into))]
    service_name: String,
    ipv4: Ipv4Addr,
}

impl Endpoint {
    /// Create an endpoint for the given service.
    pub fn new(service_name: impl Into<String>, ipv4: Ipv4Addr) -> Self {
        Endpoint {
            service_name: service_name.into(),
            ipv4,
        }
    }

    /// The reporting service's name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The reporting service's address.
    pub fn ipv4(&self) -> Ipv4Addr {
        self.ipv4
    }
}

/// A timestamped protocol milestone such as [`SERVER_RECV`].
#[derive(TypedBuilder, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    endpoint: Endpoint,
    timestamp: u64,
    #[builder(setter(into))]
    value: String,
}

impl Annotation {
    /// Microseconds since the epoch at which the milestone occurred.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The milestone marker, e.g. `"sr"`.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A key/value tag attached to the whole span.
#[derive(TypedBuilder, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryAnnotation {
    #[builder(setter(into))]
    key: String,
    #[builder(setter(into))]
    value: String,
    endpoint: Endpoint,
}

impl BinaryAnnotation {
    /// The tag key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The tag value, already coerced to its string form.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A finished span in its serialized wire form.
#[derive(TypedBuilder, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    trace_id: u64,
    #[builder(setter(into))]
    name: String,
    id: u64,
    /// `0` is the sentinel for "no parent".
    parent_id: u64,
    timestamp: u64,
    duration: u64,
    #[builder(default)]
    annotations: Vec<Annotation>,
    #[builder(default)]
    binary_annotations: Vec<BinaryAnnotation>,
}

impl SpanRecord {
    /// The trace this record belongs to.
    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    /// The recorded span's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The recorded span's id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The parent span's id, `0` for a root span.
    pub fn parent_id(&self) -> u64 {
        self.parent_id
    }

    /// Start of the span, in microseconds since the epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Span duration in microseconds.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Instant annotations, in the order they were emitted.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Binary annotations (tags), in the order they were emitted.
    pub fn binary_annotations(&self) -> &[BinaryAnnotation] {
        &self.binary_annotations
    }
}
