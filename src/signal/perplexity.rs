//! Perplexity from chosen-token log-probabilities.
//!
//! K_i: perplexity = exp(average negative log-likelihood per token).
//! Lower is more confident; 1.0 is the floor (every token had
//! probability 1).

use crate::models::Signal;

/// Average NLL above which the estimator reports infinity instead of
/// exponentiating. exp(50) ≈ 5e21, already far past any usable value.
const MAX_AVG_NLL: f64 = 50.0;

/// Compute perplexity over the log-probabilities of the tokens actually
/// emitted (natural log, ≤ 0 by convention, unenforced).
///
/// An empty sequence means the provider returned no logprobs at all:
/// `Unavailable`, not a score. Downstream this renders as the 0.0
/// sentinel in the metrics bundle.
pub fn perplexity(chosen_logprobs: &[f64]) -> Signal {
    if chosen_logprobs.is_empty() {
        return Signal::Unavailable;
    }

    let n = chosen_logprobs.len() as f64;
    let avg_nll = -chosen_logprobs.iter().sum::<f64>() / n;

    if avg_nll > MAX_AVG_NLL {
        return Signal::Measured(f64::INFINITY);
    }

    Signal::Measured(avg_nll.exp())
}
