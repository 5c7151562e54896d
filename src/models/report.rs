//! Sample and report types for credence.
//!
//! K_i: These types represent the core data flow through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One generated answer, with whatever token-level evidence the
/// provider returned alongside it.
///
/// K_i: Immutable after creation; owned by the orchestrator for the
/// duration of one pipeline run and discarded after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// Unique identifier for this generation
    pub id: String,

    /// Generated answer text (non-empty once filtered at the fan-in)
    pub text: String,

    /// Log-probability of each emitted token (natural log, ≤ 0 by
    /// convention, unenforced). Empty when the provider has none.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chosen_logprobs: Vec<f64>,

    /// Per-step top-k candidate distributions: token → log-probability.
    /// A truncated view of the full vocabulary. Empty when unavailable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_distributions: Vec<HashMap<String, f64>>,

    /// Model used for generation
    pub model: String,

    /// Generation timestamp
    pub generated_at: DateTime<Utc>,

    /// Generation time in milliseconds
    pub generation_time_ms: u64,
}

/// Outcome of one scorer.
///
/// Epistemic foundation:
/// - Measured: B_i(score) actually observed
/// - Unavailable: the input the scorer needed never existed
/// - Failed: the scorer ran and broke
///
/// The distinction keeps "0.0 because graded poorly" apart from
/// "0.0 because we never got to grade."
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Scorer produced a real value
    Measured(f64),
    /// Required input was absent (no logprobs, no grading candidates)
    Unavailable,
    /// Scorer errored; the reason is kept for telemetry
    Failed(String),
}

impl Signal {
    /// The measured value, or `default` for Unavailable/Failed.
    pub fn value_or(&self, default: f64) -> f64 {
        match self {
            Signal::Measured(v) => *v,
            _ => default,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, Signal::Measured(_))
    }

    pub fn tag(&self) -> SignalTag {
        match self {
            Signal::Measured(_) => SignalTag::Measured,
            Signal::Unavailable => SignalTag::Unavailable,
            Signal::Failed(_) => SignalTag::Failed,
        }
    }
}

/// Serializable provenance tag for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalTag {
    Measured,
    Unavailable,
    Failed,
}

/// The four scorer outcomes for one query, pre-fusion.
#[derive(Debug, Clone)]
pub struct SignalSet {
    pub consistency: Signal,
    pub reflection: Signal,
    pub perplexity: Signal,
    pub entropy: Signal,
}

/// Per-signal provenance, serialized alongside the metrics so callers
/// can tell a sentinel from a real score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalProvenance {
    pub consistency: SignalTag,
    pub reflection: SignalTag,
    pub perplexity: SignalTag,
    pub entropy: SignalTag,
}

impl From<&SignalSet> for SignalProvenance {
    fn from(signals: &SignalSet) -> Self {
        Self {
            consistency: signals.consistency.tag(),
            reflection: signals.reflection.tag(),
            perplexity: signals.perplexity.tag(),
            entropy: signals.entropy.tag(),
        }
    }
}

/// The four scalar uncertainty signals.
///
/// Invariants:
/// - `consistency_score` ∈ [0, 1]
/// - `reflection_score` ∈ [0, 1] (0.5 when no grading response came back)
/// - `perplexity` ∈ [1, ∞], with 0.0 as the "unavailable" sentinel
/// - `entropy` ≥ 0, unbounded above (not normalized against ln(k))
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub consistency_score: f64,
    pub reflection_score: f64,
    pub perplexity: f64,
    pub entropy: f64,
}

impl Metrics {
    /// Collapse tagged signals into the scalar bundle, applying the
    /// sentinel encodings and rounding to 4 decimal places for display.
    pub fn from_signals(signals: &SignalSet) -> Self {
        let reflection = match &signals.reflection {
            Signal::Measured(v) => *v,
            // No grading response at all: neutral, not doubtful
            Signal::Unavailable => 0.5,
            Signal::Failed(_) => 0.0,
        };

        Self {
            consistency_score: round4(signals.consistency.value_or(0.0)),
            reflection_score: round4(reflection),
            perplexity: round4(signals.perplexity.value_or(0.0)),
            entropy: round4(signals.entropy.value_or(0.0)),
        }
    }
}

/// Round to 4 decimal places; non-finite values pass through.
pub(crate) fn round4(v: f64) -> f64 {
    if v.is_finite() {
        (v * 10_000.0).round() / 10_000.0
    } else {
        v
    }
}

/// Final confidence verdict.
///
/// K_i: Two terminal states, no intermediate/retry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "CONFIDENT")]
    Confident,
    #[serde(rename = "UNCERTAIN")]
    Uncertain,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Confident => write!(f, "CONFIDENT"),
            Verdict::Uncertain => write!(f, "UNCERTAIN"),
        }
    }
}

/// Full result for one scored query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyReport {
    /// The query that was scored
    pub query: String,

    /// Fused verdict
    pub status: Verdict,

    /// The answer the metrics were computed against (first successful
    /// generation; positional, not score-ranked)
    pub best_answer: String,

    /// All successfully generated answer texts, in completion order
    pub answers: Vec<String>,

    /// The four scalar signals, rounded for display
    pub metrics: Metrics,

    /// Which signals were measured vs. defaulted
    pub signals: SignalProvenance,

    /// Model used for generation
    pub model: String,

    /// Scoring timestamp
    pub scored_at: DateTime<Utc>,
}

/// Input record for batch scoring.
///
/// K_i: Every query has an ID and text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Unique identifier for this query
    pub id: String,

    /// The query text
    pub query: String,

    /// Optional metadata (passed through to output)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// Statistics for a batch scoring run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Total queries read from the input
    pub total_queries: usize,

    /// Queries that produced a full report
    pub scored: usize,

    /// Reports with a CONFIDENT verdict
    pub confident: usize,

    /// Reports with an UNCERTAIN verdict
    pub uncertain: usize,

    /// Queries that produced no answers at all
    pub failed: usize,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Confident rate over scored queries (0.0 - 1.0)
    pub confident_rate: f64,
}

impl BatchStats {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.scored > 0 {
            self.confident_rate = self.confident as f64 / self.scored as f64;
        }
    }
}

/// JSON schema for the grading reply: `{score: number, reason: string}`.
///
/// Passed to providers that support schema-constrained output so the
/// reflection reply never needs free-form parsing.
pub fn reflection_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "score": { "type": "number" },
            "reason": { "type": "string" }
        },
        "required": ["score", "reason"]
    })
}
