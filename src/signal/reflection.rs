//! Self-graded reflection scoring.
//!
//! Epistemic foundation:
//! - B_i: a model can estimate the correctness of its own answer
//! - K_i: the grading reply is constrained to {score, reason} where the
//!   endpoint supports schema-constrained output
//! - I^B: grading may fail; one signal's failure must never abort the
//!   run, so every failure mode collapses to a tagged default here

use crate::client::Provider;
use crate::models::{reflection_schema, Signal};
use regex::Regex;
use tracing::warn;

/// Build the fixed-shape grading prompt for one Q&A pair.
fn grading_prompt(query: &str, answer: &str) -> String {
    format!(
        r#"Review the following Q&A pair.

Question: {query}
Proposed Answer: {answer}

Task:
1. Analyze if the answer is factually correct.
2. Provide a confidence score (0.0 to 1.0).

Reply as JSON with fields "score" (number) and "reason" (string)."#
    )
}

/// Strip a surrounding markdown code fence, if present.
///
/// Schema-constrained endpoints usually return bare JSON, but some
/// models still wrap it in ``` or ```json fences.
fn strip_code_fences(text: &str) -> &str {
    let re = match Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$") {
        Ok(re) => re,
        Err(_) => return text,
    };

    match re.captures(text) {
        Some(captures) => captures.get(1).map_or(text, |m| m.as_str()),
        None => text,
    }
}

/// Ask the grading model how much it trusts `answer` for `query`.
///
/// Outcomes:
/// - `Measured(score)` — one candidate came back and parsed; `score` is
///   the reply's numeric field clamped to [0, 1], 0.0 when the field is
///   absent or non-numeric.
/// - `Unavailable` — the oracle returned zero candidates. Distinct from
///   a real low score; fuses as the neutral 0.5.
/// - `Failed(reason)` — provider error or malformed JSON; fuses as 0.0.
///
/// Never raises.
pub async fn reflection_score(provider: &dyn Provider, query: &str, answer: &str) -> Signal {
    let prompt = grading_prompt(query, answer);
    let schema = reflection_schema();

    let candidates = match provider.grade(&prompt, &schema).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(error = %e, "Grading call failed");
            return Signal::Failed(e.to_string());
        }
    };

    let Some(raw) = candidates.first() else {
        warn!("Grading oracle returned no candidates");
        return Signal::Unavailable;
    };

    let body = strip_code_fences(raw.trim());

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(reply) => {
            let score = reply
                .get("score")
                .and_then(|s| s.as_f64())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            Signal::Measured(score)
        }
        Err(e) => {
            warn!(error = %e, "Malformed grading reply");
            Signal::Failed(format!("malformed grading reply: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredenceError, Generation, ProviderError, Result};
    use async_trait::async_trait;

    /// Grading oracle stub with a scripted outcome.
    enum GradeOutcome {
        Reply(Vec<String>),
        Error,
    }

    struct StubOracle {
        outcome: GradeOutcome,
    }

    #[async_trait]
    impl Provider for StubOracle {
        fn name(&self) -> &str {
            "stub"
        }

        fn supports_logprobs(&self) -> bool {
            false
        }

        async fn generate(&self, _prompt: &str, _temperature: f64) -> Result<Generation> {
            unreachable!("reflection never generates")
        }

        async fn grade(&self, _prompt: &str, _schema: &serde_json::Value) -> Result<Vec<String>> {
            match &self.outcome {
                GradeOutcome::Reply(candidates) => Ok(candidates.clone()),
                GradeOutcome::Error => Err(CredenceError::ProviderApi(
                    ProviderError::InvalidResponse("boom".to_string()),
                )),
            }
        }
    }

    async fn score_with(outcome: GradeOutcome) -> Signal {
        let oracle = StubOracle { outcome };
        reflection_score(&oracle, "What is the capital of France?", "Paris").await
    }

    #[tokio::test]
    async fn valid_reply_yields_its_score() {
        let signal = score_with(GradeOutcome::Reply(vec![
            r#"{"score": 0.9, "reason": "ok"}"#.to_string(),
        ]))
        .await;
        assert_eq!(signal, Signal::Measured(0.9));
    }

    #[tokio::test]
    async fn fenced_reply_parses() {
        let signal = score_with(GradeOutcome::Reply(vec![
            "```json\n{\"score\": 0.7, \"reason\": \"plausible\"}\n```".to_string(),
        ]))
        .await;
        assert_eq!(signal, Signal::Measured(0.7));
    }

    #[tokio::test]
    async fn zero_candidates_is_unavailable() {
        let signal = score_with(GradeOutcome::Reply(vec![])).await;
        assert_eq!(signal, Signal::Unavailable);
        // Neutral default, not doubtful
        assert_eq!(
            crate::models::Metrics::from_signals(&crate::models::SignalSet {
                consistency: Signal::Measured(1.0),
                reflection: signal,
                perplexity: Signal::Unavailable,
                entropy: Signal::Unavailable,
            })
            .reflection_score,
            0.5
        );
    }

    #[tokio::test]
    async fn provider_error_is_failed() {
        let signal = score_with(GradeOutcome::Error).await;
        assert!(matches!(signal, Signal::Failed(_)));
        assert_eq!(signal.value_or(0.0), 0.0);
    }

    #[tokio::test]
    async fn malformed_json_is_failed() {
        let signal =
            score_with(GradeOutcome::Reply(vec!["definitely correct!".to_string()])).await;
        assert!(matches!(signal, Signal::Failed(_)));
    }

    #[tokio::test]
    async fn missing_score_field_defaults_to_zero() {
        let signal = score_with(GradeOutcome::Reply(vec![
            r#"{"reason": "no score here"}"#.to_string(),
        ]))
        .await;
        assert_eq!(signal, Signal::Measured(0.0));
    }

    #[tokio::test]
    async fn non_numeric_score_defaults_to_zero() {
        let signal = score_with(GradeOutcome::Reply(vec![
            r#"{"score": "high", "reason": "?"}"#.to_string(),
        ]))
        .await;
        assert_eq!(signal, Signal::Measured(0.0));
    }

    #[tokio::test]
    async fn out_of_range_score_is_clamped() {
        let signal = score_with(GradeOutcome::Reply(vec![
            r#"{"score": 3.5, "reason": "overenthusiastic"}"#.to_string(),
        ]))
        .await;
        assert_eq!(signal, Signal::Measured(1.0));
    }

    #[test]
    fn strip_code_fences_handles_bare_and_fenced() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
