//! Per-request distributed tracing: span trees, pluggable observers, and a
//! batched recording pipeline.
//!
//! Each inbound request gets a tree of timed spans rooted at a server span.
//! Unrelated concerns attach to span lifecycle events through the
//! [`SpanObserver`] fan-out without coupling to each other, and finished
//! spans are serialized and shipped to a recording sink asynchronously, so
//! the request path never blocks or fails because of tracing.
//!
//! # Getting started
//!
//! ```
//! use tracepipe::{Tracer, TraceIdentity};
//!
//! let tracer = Tracer::builder()
//!     .with_service_name("my-service")
//!     .with_sample_rate(0.1)
//!     .build();
//!
//! // Per request: parse upstream headers, falling back to a fresh root.
//! let identity = TraceIdentity::from_upstream(
//!     Some("12345"), Some("0"), Some("67890"), Some(true), None,
//! )
//! .unwrap_or_else(|_| TraceIdentity::new());
//!
//! let mut server_span = tracer.make_server_span("my-service.endpoint", identity);
//! server_span.start();
//!
//! let mut child = server_span.make_child("business-logic", true, Some("biz"));
//! child.start();
//! child.set_tag("result.count", 3i64);
//! child.finish(None);
//!
//! server_span.finish(None);
//! ```
//!
//! Recording strategies live in the [`recorder`] module; the remote
//! batch-HTTP strategy ships separately in the `tracepipe-zipkin` crate.
//!
//! # Ordering
//!
//! Records reach the sink in whatever order the pipeline workers drain
//! them, not in causal parent-before-child order: many requests finish
//! spans concurrently into one shared queue. Consumers reconstruct trees
//! solely from the `traceId`/`id`/`parentId` fields.

#![warn(missing_docs, missing_debug_implementations)]

pub mod error;
pub mod identity;
pub mod observer;
pub mod record;
pub mod recorder;
pub mod sampler;
pub mod span;
pub mod tracer;

pub use error::{TraceError, TraceResult};
pub use identity::{IdentityError, SpanId, TraceFlags, TraceId, TraceIdentity};
pub use observer::{SpanObserver, TracingObserver};
pub use record::{Annotation, BinaryAnnotation, Endpoint, SpanRecord};
pub use recorder::{BatchConfig, BatchConfigBuilder, BatchRecorder, NoopRecorder, Recorder};
pub use sampler::Sampler;
pub use span::{Span, SpanKind, TagValue};
pub use tracer::{Tracer, TracerBuilder};
