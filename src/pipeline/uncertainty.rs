//! Uncertainty scoring pipeline.
//!
//! Pipeline flow:
//! Query → parallel sampling fan-out → answer texts + token evidence →
//! four scorers → fusion → verdict + metrics bundle
//!
//! Epistemic foundation:
//! - K_i: every generation request is independent; no shared mutable state
//! - B_i: each request may fail; a failed slot is dropped, never fatal
//! - K_i: the only pipeline-level error is an entirely empty batch

use crate::client::Provider;
use crate::models::{
    Config, CredenceError, Generation, Metrics, Result, SamplingConfig, Signal, SignalProvenance,
    SignalSet, UncertaintyReport,
};
use crate::pipeline::FusionPolicy;
use crate::signal::{perplexity, predictive_entropy, reflection_score, ConsistencyClusterer};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Scores one query at a time against a provider.
pub struct UncertaintyPipeline {
    provider: Arc<dyn Provider>,
    clusterer: ConsistencyClusterer,
    fusion: FusionPolicy,
    sampling: SamplingConfig,
}

impl UncertaintyPipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        clusterer: ConsistencyClusterer,
        fusion: FusionPolicy,
        sampling: SamplingConfig,
    ) -> Self {
        Self {
            provider,
            clusterer,
            fusion,
            sampling,
        }
    }

    /// Assemble a pipeline from configuration with the default
    /// similarity scorer.
    pub fn from_config(config: &Config, provider: Arc<dyn Provider>) -> Self {
        Self::new(
            provider,
            ConsistencyClusterer::with_default_scorer(config.scoring.consistency_threshold),
            FusionPolicy::from_config(&config.scoring),
            config.sampling.clone(),
        )
    }

    /// Sample `n` answers concurrently and keep the successes.
    ///
    /// Fan-out/fan-in barrier: suspends until every request finished.
    /// Per-slot failures and empty completions are logged and dropped.
    async fn sample(&self, query: &str, n: usize) -> Vec<Generation> {
        let mut handles = Vec::with_capacity(n);

        for _ in 0..n {
            let provider = Arc::clone(&self.provider);
            let prompt = query.to_string();
            let temperature = self.sampling.temperature;
            let handle =
                tokio::spawn(async move { provider.generate(&prompt, temperature).await });
            handles.push(handle);
        }

        let mut generations = Vec::new();

        for handle in handles {
            match handle.await {
                Ok(Ok(generation)) => {
                    if generation.text.trim().is_empty() {
                        warn!("Dropping empty completion");
                        continue;
                    }
                    generations.push(generation);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Generation failed");
                }
                Err(e) => {
                    warn!(error = %e, "Task panicked");
                }
            }
        }

        generations
    }

    /// Score one query.
    ///
    /// `sample_count` overrides the configured fan-out width. Returns
    /// the full report, or `NoAnswersGenerated` when every slot failed.
    pub async fn run(&self, query: &str, sample_count: Option<usize>) -> Result<UncertaintyReport> {
        let n = sample_count.unwrap_or(self.sampling.n_samples);

        info!(n = n, "Sampling answers");
        let generations = self.sample(query, n).await;

        if generations.is_empty() {
            return Err(CredenceError::NoAnswersGenerated);
        }

        let answers: Vec<String> = generations.iter().map(|g| g.text.clone()).collect();

        // Best is positional: the first successful generation. No
        // quality-based reordering.
        let best = &generations[0];

        // The four scorers have no cross-dependency; consistency runs
        // over every answer, the rest over the best one.
        let consistency = Signal::Measured(self.clusterer.score(&answers));
        let reflection = reflection_score(self.provider.as_ref(), query, &best.text).await;
        let perplexity = perplexity(&best.chosen_logprobs);
        let entropy = predictive_entropy(&best.step_distributions);

        let signals = SignalSet {
            consistency,
            reflection,
            perplexity,
            entropy,
        };

        let status = self.fusion.verdict(&signals);
        let metrics = Metrics::from_signals(&signals);

        info!(
            status = %status,
            consistency = metrics.consistency_score,
            reflection = metrics.reflection_score,
            perplexity = metrics.perplexity,
            entropy = metrics.entropy,
            answers = answers.len(),
            "Query scored"
        );

        Ok(UncertaintyReport {
            query: query.to_string(),
            status,
            best_answer: best.text.clone(),
            answers,
            metrics,
            signals: SignalProvenance::from(&signals),
            model: best.model.clone(),
            scored_at: Utc::now(),
        })
    }
}
