//! credence - Uncertainty scoring for LLM answers.
//!
//! ## Architecture
//!
//! credence combines two families of uncertainty signal:
//! - **Blackbox**: derived purely from sampled answer strings
//!   (semantic self-consistency, self-graded reflection)
//! - **Whitebox**: derived from token log-probabilities
//!   (perplexity, predictive entropy)
//!
//! ## Pipeline
//!
//! Query → N parallel generations → consistency over all texts;
//! reflection, perplexity and entropy over the best one → fusion rule →
//! CONFIDENT/UNCERTAIN verdict + metrics bundle
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, enums)
//! - B_i (Beliefs): Runtime fallible operations (Result, tagged Signal)
//! - I^R (Resolvable): User-configurable thresholds and gates
//! - I^B (Bounded): Network/API uncertainties (retry, backoff, defaults)

pub mod client;
pub mod models;
pub mod pipeline;
pub mod signal;

// Re-exports for convenience
pub use client::{LLMClient, Provider};
pub use models::{
    BatchStats, Config, CredenceError, Generation, Metrics, QueryRecord, Result, Signal,
    SignalTag, UncertaintyReport, Verdict,
};
pub use pipeline::{FusionPolicy, UncertaintyPipeline};
pub use signal::{ConsistencyClusterer, SimilarityScorer};
