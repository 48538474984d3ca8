//! Trace identity: the immutable ids, sampling state, and flags that tie a
//! span to its trace.
//!
//! An identity is either freshly generated for an un-correlatable root trace
//! or parsed from upstream propagation headers. Header parsing is all-or-
//! nothing: a partially valid header set is rejected so callers fall back to
//! a fresh root rather than trusting individual fields.

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use rand::{rngs, Rng, SeedableRng};
use thiserror::Error;

/// A 64-bit trace id shared by every span in one trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TraceId(u64);

impl TraceId {
    /// Construct a trace id from its raw value.
    pub const fn from_u64(value: u64) -> Self {
        TraceId(value)
    }

    /// The raw value of this trace id.
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A 64-bit span id, unique per node within a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Construct a span id from its raw value.
    pub const fn from_u64(value: u64) -> Self {
        SpanId(value)
    }

    /// The raw value of this span id.
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Flags propagated alongside a trace.
///
/// Bit 0 is the debug bit: it forces the sampling decision to true no matter
/// what the configured sample rate would have drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceFlags(u64);

impl TraceFlags {
    /// No flags set.
    pub const NONE: TraceFlags = TraceFlags(0);
    /// Debug flag: force the trace to be sampled.
    pub const DEBUG: TraceFlags = TraceFlags(1);

    /// Construct flags from their raw bitset value.
    pub const fn from_u64(value: u64) -> Self {
        TraceFlags(value)
    }

    /// The raw bitset value.
    pub const fn to_u64(self) -> u64 {
        self.0
    }

    /// Whether the debug bit is set.
    pub const fn is_debug(self) -> bool {
        self.0 & TraceFlags::DEBUG.0 != 0
    }

    /// Returns a copy of these flags with the debug bit set.
    pub const fn with_debug(self) -> Self {
        TraceFlags(self.0 | TraceFlags::DEBUG.0)
    }
}

/// Errors from building a [`TraceIdentity`] out of untrusted upstream
/// headers.
///
/// Callers receiving one of these must degrade to [`TraceIdentity::new`]
/// rather than propagating a failure to the request path.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    /// A required header field was absent.
    #[error("required trace header field `{0}` is missing")]
    MissingField(&'static str),

    /// A header field was present but did not parse as an unsigned 64-bit
    /// decimal integer.
    #[error("trace header field `{field}` has invalid value `{value}`")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected raw value.
        value: String,
    },
}

/// The immutable identity of a span within a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceIdentity {
    trace_id: TraceId,
    parent_id: Option<SpanId>,
    span_id: SpanId,
    sampled: Option<bool>,
    flags: TraceFlags,
}

impl TraceIdentity {
    /// Generate the identity of a fresh root trace.
    ///
    /// A single random 64-bit id serves as both trace id and span id, there
    /// is no parent, and the sampling decision is still unknown.
    pub fn new() -> Self {
        let id = random_id();
        TraceIdentity {
            trace_id: TraceId(id),
            parent_id: None,
            span_id: SpanId(id),
            sampled: None,
            flags: TraceFlags::NONE,
        }
    }

    /// Build an identity from upstream propagation headers.
    ///
    /// The three ids arrive as decimal strings and must each be present and
    /// in `[0, 2^64)`; `sampled` and `flags` are optional. Any missing or
    /// malformed field invalidates the whole set.
    pub fn from_upstream(
        trace_id: Option<&str>,
        parent_id: Option<&str>,
        span_id: Option<&str>,
        sampled: Option<bool>,
        flags: Option<&str>,
    ) -> Result<Self, IdentityError> {
        let trace_id = parse_field("trace_id", trace_id)?;
        let parent_id = parse_field("parent_id", parent_id)?;
        let span_id = parse_field("span_id", span_id)?;
        let flags = match flags {
            Some(raw) => parse_raw("flags", raw)?,
            None => 0,
        };

        Ok(TraceIdentity {
            trace_id: TraceId(trace_id),
            parent_id: Some(SpanId(parent_id)),
            span_id: SpanId(span_id),
            sampled,
            flags: TraceFlags(flags),
        })
    }

    /// The trace id shared by this span's whole subtree.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The creating span's id, or `None` for a root span.
    pub fn parent_id(&self) -> Option<SpanId> {
        self.parent_id
    }

    /// This span's own id.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The tri-state upstream sampling decision, `None` when unknown.
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// The propagated trace flags.
    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// Record the resolved sampling decision on this identity.
    pub(crate) fn set_sampled(&mut self, sampled: bool) {
        self.sampled = Some(sampled);
    }

    /// Derive the identity of a child span: same trace id and flags, a
    /// freshly generated span id, and this span as parent.
    pub(crate) fn child(&self) -> Self {
        TraceIdentity {
            trace_id: self.trace_id,
            parent_id: Some(self.span_id),
            span_id: SpanId(random_id()),
            sampled: self.sampled,
            flags: self.flags,
        }
    }
}

impl Default for TraceIdentity {
    fn default() -> Self {
        TraceIdentity::new()
    }
}

fn parse_field(field: &'static str, value: Option<&str>) -> Result<u64, IdentityError> {
    let raw = value.ok_or(IdentityError::MissingField(field))?;
    parse_raw(field, raw)
}

fn parse_raw(field: &'static str, raw: &str) -> Result<u64, IdentityError> {
    u64::from_str(raw).map_err(|_| IdentityError::InvalidField {
        field,
        value: raw.to_owned(),
    })
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_entropy());
}

/// Generate a random 64-bit id. Collision probability over 2^64 is treated
/// as negligible.
pub(crate) fn random_id() -> u64 {
    CURRENT_RNG.with(|rng| rng.borrow_mut().gen())
}

/// Draw a uniform value in `[0, 1)` for sampling decisions.
pub(crate) fn random_unit() -> f64 {
    CURRENT_RNG.with(|rng| rng.borrow_mut().gen())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_root_identity() {
        let identity = TraceIdentity::new();
        assert_eq!(identity.trace_id().to_u64(), identity.span_id().to_u64());
        assert_eq!(identity.parent_id(), None);
        assert_eq!(identity.sampled(), None);
        assert_eq!(identity.flags(), TraceFlags::NONE);
    }

    #[test]
    fn from_upstream_round_trips_ids() {
        for id in [0u64, 1, 42, u64::MAX] {
            let raw = id.to_string();
            let identity = TraceIdentity::from_upstream(
                Some(&raw),
                Some(&raw),
                Some(&raw),
                Some(true),
                None,
            )
            .unwrap();
            assert_eq!(identity.trace_id().to_u64(), id);
            assert_eq!(identity.parent_id(), Some(SpanId::from_u64(id)));
            assert_eq!(identity.span_id().to_u64(), id);
            assert_eq!(identity.sampled(), Some(true));
        }
    }

    #[test]
    fn from_upstream_rejects_missing_fields() {
        let err = TraceIdentity::from_upstream(None, Some("1"), Some("2"), None, None)
            .expect_err("missing trace id must be rejected");
        assert_eq!(err, IdentityError::MissingField("trace_id"));

        let err = TraceIdentity::from_upstream(Some("1"), None, Some("2"), None, None)
            .expect_err("missing parent id must be rejected");
        assert_eq!(err, IdentityError::MissingField("parent_id"));

        let err = TraceIdentity::from_upstream(Some("1"), Some("2"), None, None, None)
            .expect_err("missing span id must be rejected");
        assert_eq!(err, IdentityError::MissingField("span_id"));
    }

    #[test]
    fn from_upstream_upper_bound_is_exclusive() {
        // 2^64 overflows u64 and must fail validation.
        let too_big = "18446744073709551616";
        let err = TraceIdentity::from_upstream(Some(too_big), Some("1"), Some("2"), None, None)
            .expect_err("2^64 is out of range");
        assert!(matches!(
            err,
            IdentityError::InvalidField {
                field: "trace_id",
                ..
            }
        ));
    }

    #[test]
    fn from_upstream_rejects_negative_and_garbage() {
        for bad in ["-1", "abc", "1.5", ""] {
            assert!(
                TraceIdentity::from_upstream(Some("1"), Some(bad), Some("2"), None, None).is_err(),
                "`{bad}` should fail validation"
            );
        }
    }

    #[test]
    fn from_upstream_parses_flags() {
        let identity =
            TraceIdentity::from_upstream(Some("1"), Some("2"), Some("3"), None, Some("1")).unwrap();
        assert!(identity.flags().is_debug());

        let identity =
            TraceIdentity::from_upstream(Some("1"), Some("2"), Some("3"), None, Some("0")).unwrap();
        assert!(!identity.flags().is_debug());

        assert!(
            TraceIdentity::from_upstream(Some("1"), Some("2"), Some("3"), None, Some("x")).is_err()
        );
    }

    #[test]
    fn child_identities_share_the_trace() {
        let mut root = TraceIdentity::new();
        root.set_sampled(true);
        let child = root.child();
        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.parent_id(), Some(root.span_id()));
        assert_ne!(child.span_id(), root.span_id());
        assert_eq!(child.sampled(), Some(true));
    }

    #[test]
    fn debug_flag_bit() {
        assert!(TraceFlags::NONE.with_debug().is_debug());
        assert!(TraceFlags::from_u64(3).is_debug());
        assert!(!TraceFlags::from_u64(2).is_debug());
    }
}
