//! Predictive entropy from per-step top-k distributions.
//!
//! Epistemic foundation:
//! - K_i: Shannon entropy over a renormalized truncated support
//! - B_i: the top-k view approximates the full vocabulary distribution;
//!   it systematically underestimates true entropy when the excluded
//!   tail mass is non-trivial. Accepted approximation, not a defect.

use crate::models::Signal;
use std::collections::HashMap;

/// Average Shannon entropy of the next-token distribution across
/// generation steps.
///
/// Each step maps up to k candidate tokens to their natural-log
/// probabilities. Per step: exponentiate, renormalize over the
/// truncated support, then `-Σ p·ln(p)` over p strictly > 0. Steps
/// whose linear mass sums to exactly zero are skipped entirely; they
/// neither count toward the mean's denominator nor raise.
///
/// High entropy means the model kept splitting probability across
/// alternatives while generating; low entropy means each token was
/// close to forced.
pub fn predictive_entropy(step_distributions: &[HashMap<String, f64>]) -> Signal {
    if step_distributions.is_empty() {
        return Signal::Unavailable;
    }

    let mut total_entropy = 0.0;
    let mut counted = 0usize;

    for dist in step_distributions {
        let probs: Vec<f64> = dist.values().map(|lp| lp.exp()).collect();
        let sum_p: f64 = probs.iter().sum();

        // Degenerate step: every candidate underflowed to zero mass
        if sum_p == 0.0 {
            continue;
        }

        let step_entropy: f64 = probs
            .iter()
            .map(|p| p / sum_p)
            .filter(|p| *p > 0.0)
            .map(|p| -p * p.ln())
            .sum();

        total_entropy += step_entropy;
        counted += 1;
    }

    if counted == 0 {
        Signal::Measured(0.0)
    } else {
        Signal::Measured(total_entropy / counted as f64)
    }
}

/// Detached logit-tensor variant: entropy straight from raw logit rows,
/// optionally normalized by ln(vocab) so 1.0 means maximal uncertainty.
///
/// Not part of the scored pipeline (whose entropy stays unnormalized);
/// useful when a caller has full-vocabulary logits rather than top-k
/// logprob maps.
pub fn token_entropy(logits: &[Vec<f64>], normalize: bool) -> f64 {
    if logits.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    let mut counted = 0usize;

    for row in logits {
        if row.len() < 2 {
            // One candidate carries no choice, hence no uncertainty
            counted += 1;
            continue;
        }

        // Softmax with max-subtraction for numeric stability
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = row.iter().map(|l| (l - max).exp()).collect();
        let sum: f64 = exps.iter().sum();

        let mut h: f64 = exps
            .iter()
            .map(|e| e / sum)
            .filter(|p| *p > 0.0)
            .map(|p| -p * p.ln())
            .sum();

        if normalize {
            h /= (row.len() as f64).ln();
        }

        total += h;
        counted += 1;
    }

    if counted == 0 {
        0.0
    } else {
        total / counted as f64
    }
}
