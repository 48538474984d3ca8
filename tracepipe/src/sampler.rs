//! The once-per-trace record/don't-record decision.

use crate::identity::{self, TraceIdentity};

/// Decides whether a server span, and with it the whole trace subtree, is
/// recorded.
///
/// The decision is made exactly once, at server-span creation. An upstream
/// service that already declared the trace sampled or unsampled is
/// respected; otherwise a uniform draw against the configured rate decides.
/// The debug trace flag forces sampling independent of the draw. Child
/// spans inherit the decision through their shared trace identity and are
/// never independently re-sampled.
#[derive(Clone, Debug)]
pub struct Sampler {
    sample_rate: f64,
}

impl Sampler {
    /// Create a sampler recording the given fraction of traces.
    ///
    /// Rates are clamped to `[0.0, 1.0]`; `0.0` never samples and `1.0`
    /// always does, regardless of randomness.
    pub fn new(sample_rate: f64) -> Self {
        Sampler {
            sample_rate: sample_rate.clamp(0.0, 1.0),
        }
    }

    /// The configured sample rate.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Resolve the sampling decision for a server span with this identity.
    pub fn should_sample(&self, identity: &TraceIdentity) -> bool {
        let decision = match identity.sampled() {
            Some(upstream) => upstream,
            None => identity::random_unit() < self.sample_rate,
        };
        decision || identity.flags().is_debug()
    }
}
