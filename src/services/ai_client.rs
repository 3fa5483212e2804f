//! Recommendation client for the generative model provider.
//!
//! Provides:
//! - A provider seam ([`CompletionProvider`]) with an OpenAI-compatible
//!   chat-completions implementation
//! - JSON output mode at a fixed temperature
//! - Bounded retries with exponential backoff for transient failures
//! - A per-attempt timeout
//! - Best-effort audit logging of every successful call

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::LlmSettings;
use crate::domain::recommendation::{Completion, TokenUsage};
use crate::error::{ApiError, ApiResult};
use crate::services::prompt::SYSTEM_PROMPT;
use crate::store::{RecommendationLogEntry, RecommendationLogSink};

/// Sampling temperature for every recommendation call.
pub const TEMPERATURE: f32 = 0.7;

/// Provider-neutral completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub json_output: bool,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider returned no content")]
    EmptyContent,

    #[error("invalid provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Failures worth retrying: the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyContent | Self::Decode(_) => false,
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        ApiError::Provider(e.to_string())
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<ProviderResponse, ProviderError>;
}

// =============================================================================
// OpenAI-compatible provider
// =============================================================================

pub struct OpenAiProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ChatErrorBody {
    error: ChatErrorDetail,
}

#[derive(Deserialize)]
struct ChatErrorDetail {
    message: String,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        // Url::join replaces the last segment unless the base ends with '/'
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join("chat/completions"))
            .context("Invalid LLM_BASE_URL")?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<ProviderResponse, ProviderError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            response_format: request.json_output.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ChatErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProviderError::EmptyContent)?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(ProviderResponse { text, usage })
    }
}

// =============================================================================
// Recommendation client
// =============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
        }
    }

    /// Longest a call can run with `timeout` per attempt: every attempt times
    /// out and every wait hits the jittered ceiling (1.5 x `max_interval`).
    pub fn worst_case(&self, timeout: Duration) -> Duration {
        let attempts = self.max_retries + 1;
        timeout * attempts + self.max_interval * 3 / 2 * self.max_retries
    }
}

/// Client for recommendation calls.
///
/// `provider` is `None` when no credentials were configured; every call then
/// fails with [`ApiError::ProviderUnavailable`] before any work is done.
#[derive(Clone)]
pub struct RecommendationClient {
    provider: Option<Arc<dyn CompletionProvider>>,
    log_sink: Arc<dyn RecommendationLogSink>,
    model: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl RecommendationClient {
    pub fn new(
        provider: Option<Arc<dyn CompletionProvider>>,
        log_sink: Arc<dyn RecommendationLogSink>,
        model: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            log_sink,
            model: model.to_string(),
            timeout,
            retry,
        }
    }

    pub fn from_settings(settings: &LlmSettings, log_sink: Arc<dyn RecommendationLogSink>) -> Result<Self> {
        let provider: Option<Arc<dyn CompletionProvider>> = match &settings.api_key {
            Some(key) => Some(Arc::new(OpenAiProvider::new(
                &settings.base_url,
                key,
                settings.timeout_seconds,
            )?)),
            None => {
                warn!("LLM_API_KEY not set - recommendations are disabled");
                None
            }
        };

        info!(
            model = %settings.model,
            configured = provider.is_some(),
            "Recommendation client initialized"
        );

        Ok(Self::new(
            provider,
            log_sink,
            &settings.model,
            Duration::from_secs(settings.timeout_seconds),
            RetryPolicy::new(settings.max_retries),
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Run one recommendation call and audit it.
    #[instrument(skip(self, user_prompt), fields(model = %self.model))]
    pub async fn recommend(&self, user_id: Uuid, user_prompt: String) -> ApiResult<Completion> {
        let provider = self.provider.as_ref().ok_or(ApiError::ProviderUnavailable)?;

        let request = CompletionRequest {
            model: self.model.clone(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt,
            json_output: true,
            temperature: TEMPERATURE,
        };

        let response = self.call_with_retry(provider.as_ref(), &request).await?;

        info!(
            user_id = %user_id,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            total_tokens = response.usage.total_tokens,
            "Recommendation generated"
        );

        self.record(RecommendationLogEntry {
            user_id,
            model: self.model.clone(),
            system_prompt: request.system_prompt,
            prompt: request.user_prompt,
            raw_response: response.text.clone(),
            usage: response.usage,
            timestamp: Utc::now(),
        });

        Ok(Completion {
            raw_json_text: response.text,
            usage: response.usage,
        })
    }

    async fn call_with_retry(
        &self,
        provider: &dyn CompletionProvider,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry.initial_interval)
            .with_max_interval(self.retry.max_interval)
            .with_max_elapsed_time(None)
            .build();

        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let timeout = self.timeout;
        let max_retries = self.retry.max_retries;

        backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let result = match tokio::time::timeout(timeout, provider.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };

            result.map_err(|e| {
                if e.is_transient() && attempt <= max_retries {
                    warn!(attempt, error = %e, "Recommendation call failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    error!(attempt, error = %e, "Recommendation call failed");
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    /// Append to the audit log without blocking or failing the caller.
    fn record(&self, entry: RecommendationLogEntry) {
        let sink = Arc::clone(&self.log_sink);
        tokio::spawn(async move {
            let user_id = entry.user_id;
            match sink.append(entry).await {
                Ok(()) => debug!(user_id = %user_id, "Recommendation log appended"),
                Err(e) => warn!(user_id = %user_id, error = %e, "Failed to append recommendation log"),
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{client, ScriptedProvider};
    use super::*;
    use crate::store::memory::MemoryStore;

    async fn settle_logs(store: &MemoryStore, expected: usize) {
        for _ in 0..50 {
            if store.logs().len() >= expected {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn sends_json_mode_request_and_logs_the_call() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new().reply(r#"{"overall_reason":"ok"}"#));
        let user_id = Uuid::new_v4();

        let completion = client(provider.clone(), store.clone())
            .recommend(user_id, "pick vendors".to_string())
            .await
            .unwrap();

        assert_eq!(completion.raw_json_text, r#"{"overall_reason":"ok"}"#);
        assert_eq!(completion.usage.total_tokens, 160);

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_output);
        assert_eq!(requests[0].temperature, TEMPERATURE);
        assert_eq!(requests[0].system_prompt, SYSTEM_PROMPT);
        assert_eq!(requests[0].model, "test-model");

        settle_logs(&store, 1).await;
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].user_id, user_id);
        assert_eq!(logs[0].system_prompt, SYSTEM_PROMPT);
        assert_eq!(logs[0].prompt, "pick vendors");
        assert_eq!(logs[0].usage.prompt_tokens, 120);
    }

    #[tokio::test]
    async fn log_failures_do_not_fail_the_call() {
        let store = Arc::new(MemoryStore::with_failing_log());
        let provider = Arc::new(ScriptedProvider::new().reply("{}"));

        let result = client(provider, store.clone())
            .recommend(Uuid::new_v4(), "p".to_string())
            .await;

        assert!(result.is_ok());
        tokio::task::yield_now().await;
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_client_fails_before_calling_out() {
        let store = Arc::new(MemoryStore::new());
        let client = RecommendationClient::new(
            None,
            store.clone(),
            "test-model",
            Duration::from_secs(1),
            RetryPolicy::new(0),
        );

        assert!(!client.is_configured());
        let err = client.recommend(Uuid::new_v4(), "p".into()).await.unwrap_err();
        assert!(matches!(err, ApiError::ProviderUnavailable));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail(ProviderError::Status {
                    status: 503,
                    message: "overloaded".into(),
                })
                .fail(ProviderError::Transport("reset".into()))
                .reply("{}"),
        );

        let result = client(provider.clone(), store)
            .recommend(Uuid::new_v4(), "p".into())
            .await;

        assert!(result.is_ok());
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail(ProviderError::Timeout)
                .fail(ProviderError::Timeout)
                .fail(ProviderError::Timeout)
                .reply("{}"),
        );

        let err = client(provider.clone(), store)
            .recommend(Uuid::new_v4(), "p".into())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Provider(_)));
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new().fail(ProviderError::Status {
            status: 400,
            message: "bad request".into(),
        }));

        let err = client(provider.clone(), store.clone())
            .recommend(Uuid::new_v4(), "p".into())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Provider(_)));
        assert_eq!(provider.requests().len(), 1);
        assert!(store.logs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_as_provider_failure() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::with_delay(Duration::from_secs(30)).reply("{}"));
        let client = RecommendationClient::new(
            Some(provider),
            store,
            "test-model",
            Duration::from_secs(1),
            RetryPolicy::new(0),
        );

        let err = client.recommend(Uuid::new_v4(), "p".into()).await.unwrap_err();
        assert!(matches!(err, ApiError::Provider(msg) if msg.contains("timed out")));
    }

    #[test]
    fn worst_case_covers_every_attempt_and_wait() {
        let policy = RetryPolicy::new(2);
        // 3 attempts x 60s plus 2 waits capped at 7.5s
        assert_eq!(policy.worst_case(Duration::from_secs(60)), Duration::from_secs(195));
        assert_eq!(RetryPolicy::new(0).worst_case(Duration::from_secs(60)), Duration::from_secs(60));
    }

    #[test]
    fn endpoint_is_joined_under_the_base_path() {
        let provider = OpenAiProvider::new("http://llm.internal/v1", "k", 5).unwrap();
        assert_eq!(provider.endpoint.as_str(), "http://llm.internal/v1/chat/completions");
    }
}
