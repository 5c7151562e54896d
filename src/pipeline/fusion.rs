//! Multi-signal fusion into a single verdict.
//!
//! K_i: Two terminal states, no intermediate/retry state.
//! I^R: The three gates are independent policy constants.

use crate::models::{ScoringConfig, Signal, SignalSet, Verdict};

/// Gating thresholds for the CONFIDENT verdict.
///
/// CONFIDENT iff consistency clears its gate AND reflection clears its
/// gate AND perplexity is below its gate or was never measured.
#[derive(Debug, Clone)]
pub struct FusionPolicy {
    /// Minimum consistency score (exclusive)
    pub consistency_gate: f64,
    /// Minimum reflection score (exclusive)
    pub reflection_gate: f64,
    /// Maximum perplexity (exclusive)
    pub perplexity_gate: f64,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            consistency_gate: 0.8,
            reflection_gate: 0.5,
            perplexity_gate: 10.0,
        }
    }
}

impl FusionPolicy {
    pub fn from_config(scoring: &ScoringConfig) -> Self {
        Self {
            consistency_gate: scoring.consistency_gate,
            reflection_gate: scoring.reflection_gate,
            perplexity_gate: scoring.perplexity_gate,
        }
    }

    /// Evaluate the gates over the four tagged signals.
    ///
    /// An unavailable perplexity does not disqualify: when a provider
    /// returns no logprobs at all the whitebox gate stands open, and
    /// only the provenance tags record that nothing was measured. An
    /// unavailable reflection fuses as the neutral 0.5, which does NOT
    /// clear the (exclusive) reflection gate.
    pub fn verdict(&self, signals: &SignalSet) -> Verdict {
        let consistency = signals.consistency.value_or(0.0);

        let reflection = match &signals.reflection {
            Signal::Measured(v) => *v,
            Signal::Unavailable => 0.5,
            Signal::Failed(_) => 0.0,
        };

        let perplexity_ok = match &signals.perplexity {
            Signal::Measured(p) => *p < self.perplexity_gate,
            Signal::Unavailable | Signal::Failed(_) => true,
        };

        if consistency > self.consistency_gate
            && reflection > self.reflection_gate
            && perplexity_ok
        {
            Verdict::Confident
        } else {
            Verdict::Uncertain
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(consistency: f64, reflection: f64, perplexity: Signal) -> SignalSet {
        SignalSet {
            consistency: Signal::Measured(consistency),
            reflection: Signal::Measured(reflection),
            perplexity,
            entropy: Signal::Measured(0.1),
        }
    }

    #[test]
    fn all_gates_pass() {
        let policy = FusionPolicy::default();
        let verdict = policy.verdict(&signals(0.9, 0.6, Signal::Measured(5.0)));
        assert_eq!(verdict, Verdict::Confident);
    }

    #[test]
    fn high_perplexity_disqualifies() {
        let policy = FusionPolicy::default();
        let verdict = policy.verdict(&signals(0.9, 0.6, Signal::Measured(50.0)));
        assert_eq!(verdict, Verdict::Uncertain);
    }

    #[test]
    fn low_consistency_disqualifies_despite_strong_reflection() {
        let policy = FusionPolicy::default();
        let verdict = policy.verdict(&signals(0.5, 0.9, Signal::Measured(1.0)));
        assert_eq!(verdict, Verdict::Uncertain);
    }

    #[test]
    fn unavailable_perplexity_does_not_disqualify() {
        let policy = FusionPolicy::default();
        let verdict = policy.verdict(&signals(0.9, 0.6, Signal::Unavailable));
        assert_eq!(verdict, Verdict::Confident);
    }

    #[test]
    fn infinite_perplexity_disqualifies() {
        let policy = FusionPolicy::default();
        let verdict = policy.verdict(&signals(0.9, 0.6, Signal::Measured(f64::INFINITY)));
        assert_eq!(verdict, Verdict::Uncertain);
    }

    #[test]
    fn gates_are_exclusive_at_the_boundary() {
        let policy = FusionPolicy::default();
        // Exactly at a gate is not above it
        assert_eq!(
            policy.verdict(&signals(0.8, 0.6, Signal::Measured(1.0))),
            Verdict::Uncertain
        );
        assert_eq!(
            policy.verdict(&signals(0.9, 0.5, Signal::Measured(1.0))),
            Verdict::Uncertain
        );
    }

    #[test]
    fn unavailable_reflection_fuses_neutral_and_fails_the_gate() {
        let policy = FusionPolicy::default();
        let set = SignalSet {
            consistency: Signal::Measured(0.9),
            reflection: Signal::Unavailable,
            perplexity: Signal::Measured(1.0),
            entropy: Signal::Unavailable,
        };
        assert_eq!(policy.verdict(&set), Verdict::Uncertain);
    }

    #[test]
    fn failed_reflection_fuses_to_zero() {
        let policy = FusionPolicy::default();
        let set = SignalSet {
            consistency: Signal::Measured(0.9),
            reflection: Signal::Failed("oracle down".to_string()),
            perplexity: Signal::Measured(1.0),
            entropy: Signal::Unavailable,
        };
        assert_eq!(policy.verdict(&set), Verdict::Uncertain);
    }
}
