//! Generic LLM client for OpenAI-compatible endpoints.
//!
//! Epistemic foundation:
//! - K_i: OpenAI API schema is the de facto standard
//! - K_i: Aggregators (OpenRouter) and on-prem (vLLM, Ollama) all support it
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Response will be valid JSON (might fail)
//! - I^B: Whether an endpoint returns logprobs is resolved once, at
//!   construction, via the `supports_logprobs` capability flag

use crate::models::{Config, CredenceError, Generation, ProviderError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// An answer source the pipeline can sample and grade against.
///
/// The capability flag is decided when the provider is constructed,
/// never probed per call.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Endpoint name, for logging.
    fn name(&self) -> &str;

    /// Whether generations carry token log-probabilities.
    fn supports_logprobs(&self) -> bool;

    /// Generate one answer for the prompt.
    ///
    /// B_i(generation succeeds) → Result<Generation>
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<Generation>;

    /// Ask the grading model to reply to `prompt`, constrained to
    /// `schema` where the endpoint supports it. Returns the raw text of
    /// every candidate; an empty list means the model sent nothing back.
    async fn grade(&self, prompt: &str, schema: &serde_json::Value) -> Result<Vec<String>>;
}

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_logprobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Token-level logprobs for one choice.
#[derive(Debug, Deserialize)]
struct ChoiceLogprobs {
    content: Option<Vec<TokenLogprob>>,
}

#[derive(Debug, Deserialize)]
struct TokenLogprob {
    token: String,
    logprob: f64,
    #[serde(default)]
    top_logprobs: Vec<TopLogprob>,
}

#[derive(Debug, Deserialize)]
struct TopLogprob {
    token: String,
    logprob: f64,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// LLM client for any OpenAI-compatible chat-completions endpoint.
///
/// Supports:
/// - OpenAI (default)
/// - OpenRouter, Together AI, Groq (aggregators)
/// - Gemini via its OpenAI-compatible endpoint
/// - vLLM, TGI, Ollama, llama.cpp (on-prem)
///
/// Features:
/// - Token logprobs + top-k distributions when the endpoint has them
/// - Schema-constrained JSON output for grading calls
/// - Retry with exponential backoff, no retry on auth/not-found
/// - Running token totals
pub struct LLMClient {
    client: reqwest::Client,
    /// Endpoint name (for logging)
    name: String,
    /// API key (None for local endpoints without auth)
    api_key: Option<String>,
    base_url: String,
    /// Model used for generation
    model: String,
    /// Model used for grading calls
    grading_model: String,
    grading_temperature: f64,
    /// Top-k candidates requested per generation step
    top_k_logprobs: u32,
    supports_logprobs: bool,
    timeout: Duration,
    max_retries: u32,
    // Token tracking
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
}

impl LLMClient {
    /// Create a client from resolved configuration.
    pub fn from_config(config: &Config, api_key: Option<String>) -> Result<Self> {
        Self::new(
            "provider".to_string(),
            api_key,
            config.provider.base_url.clone(),
            config.provider.model.clone(),
            config.grading_model().to_string(),
            config.grading.temperature,
            config.sampling.top_k_logprobs,
            config.provider.supports_logprobs,
            config.provider.timeout_secs,
            config.provider.max_retries,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        api_key: Option<String>,
        base_url: String,
        model: String,
        grading_model: String,
        grading_temperature: f64,
        top_k_logprobs: u32,
        supports_logprobs: bool,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CredenceError::Network)?;

        Ok(Self {
            client,
            name,
            api_key,
            base_url,
            model,
            grading_model,
            grading_temperature,
            top_k_logprobs,
            supports_logprobs,
            timeout,
            max_retries,
            total_input_tokens: AtomicU64::new(0),
            total_output_tokens: AtomicU64::new(0),
        })
    }

    /// Build headers for a request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// Send a chat completion request with retry.
    ///
    /// B_i(API available) → Result
    /// B_i(valid response) → Result
    /// I^B(rate limits) → exponential backoff
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error: Option<CredenceError> = None;

        for attempt in 0..self.max_retries {
            let response = self
                .client
                .post(&url)
                .headers(self.headers())
                .json(request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(CredenceError::Timeout(self.timeout));
                    } else {
                        last_error = Some(CredenceError::Network(e));
                    }
                    if attempt < self.max_retries - 1 {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            endpoint = %self.name,
                            attempt = attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0);

                last_error = Some(CredenceError::ProviderApi(ProviderError::RateLimited {
                    retry_after_secs: retry_after,
                }));

                if attempt < self.max_retries - 1 {
                    debug!(
                        endpoint = %self.name,
                        attempt = attempt,
                        retry_after_secs = retry_after,
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                }
                continue;
            }

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let error =
                    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
                        if status == 401 {
                            ProviderError::AuthenticationFailed
                        } else if status == 404 {
                            ProviderError::ModelNotFound(request.model.clone())
                        } else {
                            ProviderError::ApiError {
                                status,
                                message: api_error.error.message,
                            }
                        }
                    } else {
                        ProviderError::ApiError {
                            status,
                            message: error_body,
                        }
                    };

                last_error = Some(CredenceError::ProviderApi(error));

                // Don't retry auth errors or not found
                if status == 401 || status == 404 {
                    break;
                }

                if attempt < self.max_retries - 1 {
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            let body: ChatCompletionResponse = response.json().await.map_err(|e| {
                CredenceError::ParseError(format!("Failed to parse response: {e}"))
            })?;

            if let Some(usage) = &body.usage {
                self.total_input_tokens
                    .fetch_add(usage.prompt_tokens as u64, Ordering::Relaxed);
                self.total_output_tokens
                    .fetch_add(usage.completion_tokens as u64, Ordering::Relaxed);
            }

            return Ok(body);
        }

        Err(last_error.unwrap_or_else(|| {
            CredenceError::ProviderApi(ProviderError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "Unknown error".to_string(),
            })
        }))
    }

    /// Get total tokens tracked (input, output).
    pub fn total_tokens(&self) -> (u64, u64) {
        (
            self.total_input_tokens.load(Ordering::Relaxed),
            self.total_output_tokens.load(Ordering::Relaxed),
        )
    }
}

/// Convert one choice's token logprobs into the pipeline's evidence
/// shape: the emitted token's logprob per step, and the top-k
/// token → logprob map per step.
fn unpack_logprobs(tokens: Vec<TokenLogprob>) -> (Vec<f64>, Vec<HashMap<String, f64>>) {
    let chosen = tokens.iter().map(|t| t.logprob).collect();
    let steps = tokens
        .into_iter()
        .map(|t| {
            if t.top_logprobs.is_empty() {
                // Some endpoints omit alternatives; the emitted token is
                // still a 1-entry distribution
                HashMap::from([(t.token, t.logprob)])
            } else {
                t.top_logprobs
                    .into_iter()
                    .map(|c| (c.token, c.logprob))
                    .collect()
            }
        })
        .collect();
    (chosen, steps)
}

#[async_trait]
impl Provider for LLMClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_logprobs(&self) -> bool {
        self.supports_logprobs
    }

    async fn generate(&self, prompt: &str, temperature: f64) -> Result<Generation> {
        let start = Instant::now();

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            temperature,
            logprobs: self.supports_logprobs.then_some(true),
            top_logprobs: self.supports_logprobs.then_some(self.top_k_logprobs),
            response_format: None,
        };

        let body = self.complete(&request).await?;
        let model = body.model.unwrap_or_else(|| self.model.clone());

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            CredenceError::ProviderApi(ProviderError::InvalidResponse(
                "No choices in response".to_string(),
            ))
        })?;

        let text = choice.message.content.unwrap_or_default();
        let (chosen_logprobs, step_distributions) = match choice.logprobs.and_then(|l| l.content) {
            Some(tokens) => unpack_logprobs(tokens),
            None => (Vec::new(), Vec::new()),
        };

        debug!(
            endpoint = %self.name,
            chars = text.len(),
            steps = step_distributions.len(),
            "Generated answer"
        );

        Ok(Generation {
            id: Uuid::new_v4().to_string(),
            text,
            chosen_logprobs,
            step_distributions,
            model,
            generated_at: Utc::now(),
            generation_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn grade(&self, prompt: &str, schema: &serde_json::Value) -> Result<Vec<String>> {
        let request = ChatCompletionRequest {
            model: self.grading_model.clone(),
            messages: vec![Message::user(prompt)],
            temperature: self.grading_temperature,
            logprobs: None,
            top_logprobs: None,
            response_format: Some(serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "grading_reply",
                    "schema": schema,
                    "strict": true
                }
            })),
        };

        let body = self.complete(&request).await?;

        Ok(body
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_logprobs_keeps_step_order_and_chosen_values() {
        let tokens = vec![
            TokenLogprob {
                token: "Par".to_string(),
                logprob: -0.1,
                top_logprobs: vec![
                    TopLogprob {
                        token: "Par".to_string(),
                        logprob: -0.1,
                    },
                    TopLogprob {
                        token: "Lon".to_string(),
                        logprob: -2.5,
                    },
                ],
            },
            TokenLogprob {
                token: "is".to_string(),
                logprob: -0.05,
                top_logprobs: vec![],
            },
        ];

        let (chosen, steps) = unpack_logprobs(tokens);
        assert_eq!(chosen, vec![-0.1, -0.05]);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].len(), 2);
        assert_eq!(steps[0]["Lon"], -2.5);
        // Missing alternatives degrade to a single-entry distribution
        assert_eq!(steps[1].len(), 1);
        assert_eq!(steps[1]["is"], -0.05);
    }
}
