use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use super::retry::{self, RetryDecision};
use super::wire::{CompletionRequest, CompletionResponse, ModelsResponse, WireMessage};
use super::{BackendClient, BackendCompletion, BackendQuery, ModelCatalogEntry};
use crate::error::BackendError;
use crate::options::{ContextSize, WebSearch};

/// Maximum time to wait for response headers after sending the request,
/// matching the teacher's `HEADERS_TIMEOUT` discipline for bounding a
/// single network round-trip independent of the overall cancellation
/// handle.
const HEADERS_TIMEOUT: Duration = Duration::from_secs(60);

/// `HttpBackendClient` speaks the wire protocol in §6 to one remote
/// gateway: a single POST per completion (`stream:false`, per the
/// orchestration contract explicitly not streaming tokens), with the
/// retry/backoff policy in §4.1 and cooperative cancellation via
/// [`tokio_util::sync::CancellationToken`].
pub struct HttpBackendClient {
    client: Client,
    base_url: String,
    api_key: String,
    referer: String,
    title: String,
}

impl HttpBackendClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_identity(base_url, api_key, "https://github.com/conclave", "Conclave")
    }

    pub fn with_identity(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        }
    }

    fn headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
    }

    fn build_body(&self, query: &BackendQuery, schema: Option<&serde_json::Value>) -> CompletionRequest {
        let messages = query.messages.iter().map(WireMessage::from).collect();

        let (provider, plugins) = match &query.web_search {
            None => (None, None),
            Some(WebSearch::Enabled) => (
                None,
                Some(serde_json::json!([{
                    "id": "web",
                    "max_results": crate::options::DEFAULT_WEB_SEARCH_RESULTS,
                }])),
            ),
            Some(WebSearch::MaxResults { max_results }) => (
                None,
                Some(serde_json::json!([{"id": "web", "max_results": max_results}])),
            ),
            Some(WebSearch::SearchContextSize {
                search_context_size,
            }) => {
                let size = match search_context_size {
                    ContextSize::Low => "low",
                    ContextSize::Medium => "medium",
                    ContextSize::High => "high",
                };
                (
                    Some(serde_json::json!({"search_context_size": size})),
                    None,
                )
            }
        };

        let response_format = schema.map(|s| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": {"name": "response", "strict": true, "schema": s},
            })
        });

        CompletionRequest {
            model: query.model.clone(),
            messages,
            temperature: query.temperature,
            stream: false,
            max_tokens: query.max_tokens,
            provider,
            plugins,
            response_format,
        }
    }

    /// One attempt at the POST — no retry logic here, that lives in
    /// [`Self::query_model`] / [`Self::query_structured`] so both can share it.
    async fn send_once(
        &self,
        query: &BackendQuery,
        schema: Option<&serde_json::Value>,
        start: Instant,
    ) -> Result<CompletionResponse, AttemptError> {
        let body = self.build_body(query, schema);
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.headers(self.client.post(&url)).json(&body);

        let cancel_fut = query.cancel.cancelled();
        tokio::pin!(cancel_fut);

        let send_fut = tokio::time::timeout(HEADERS_TIMEOUT, request.send());
        let response = tokio::select! {
            biased;
            _ = &mut cancel_fut => return Err(AttemptError::Cancelled),
            result = send_fut => result,
        };

        let response = match response {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(AttemptError::Network(e.to_string())),
            Err(_) => {
                return Err(AttemptError::Network(format!(
                    "timed out waiting for response headers after {}ms",
                    start.elapsed().as_millis()
                )));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(AttemptError::RateLimit { retry_after });
        }
        // 429 is already carved out above, so a retryable status here is
        // always a 5xx.
        if retry::is_retryable_status(status.as_u16()) {
            return Err(AttemptError::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let truncated: String = body_text.chars().take(500).collect();
            return Err(AttemptError::RemoteApi {
                status: status.as_u16(),
                message: truncated,
            });
        }

        let body_fut = response.json::<CompletionResponse>();
        let body_result = tokio::select! {
            biased;
            _ = &mut cancel_fut => return Err(AttemptError::Cancelled),
            result = body_fut => result,
        };
        body_result.map_err(|e| AttemptError::Validation(format!("undecodable body: {e}")))
    }

    /// Drive the retry/backoff loop in §4.1 around one logical query,
    /// bounded by the per-request deadline in `retry::MAX_TOTAL_DURATION`
    /// (§4.10).
    async fn query_with_retry(
        &self,
        query: &BackendQuery,
        schema: Option<&serde_json::Value>,
    ) -> Result<(CompletionResponse, u64), BackendError> {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            if query.cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }

            match self.send_once(query, schema, start).await {
                Ok(resp) => return Ok((resp, start.elapsed().as_millis() as u64)),
                Err(AttemptError::Cancelled) => return Err(BackendError::Cancelled),
                Err(AttemptError::Validation(msg)) => return Err(BackendError::Validation(msg)),
                Err(AttemptError::RemoteApi { status, message }) => {
                    return Err(BackendError::RemoteApi { status, message });
                }
                Err(AttemptError::RateLimit { retry_after }) => {
                    match retry::scheduled_retry(attempt, retry_after, start.elapsed()) {
                        RetryDecision::Retry(delay) => {
                            attempt += 1;
                            if !self.sleep_cancellable(delay, &query.cancel).await {
                                return Err(BackendError::Cancelled);
                            }
                        }
                        RetryDecision::GiveUp => {
                            return Err(BackendError::RateLimit {
                                retry_after_secs: retry_after,
                            });
                        }
                    }
                }
                Err(AttemptError::ServerError(status)) => {
                    match retry::scheduled_retry(attempt, None, start.elapsed()) {
                        RetryDecision::Retry(delay) => {
                            attempt += 1;
                            if !self.sleep_cancellable(delay, &query.cancel).await {
                                return Err(BackendError::Cancelled);
                            }
                        }
                        RetryDecision::GiveUp => {
                            return Err(BackendError::RemoteApi {
                                status,
                                message: "server error after exhausting retries".to_string(),
                            });
                        }
                    }
                }
                Err(AttemptError::Network(msg)) => {
                    match retry::scheduled_retry(attempt, None, start.elapsed()) {
                        RetryDecision::Retry(delay) => {
                            attempt += 1;
                            if !self.sleep_cancellable(delay, &query.cancel).await {
                                return Err(BackendError::Cancelled);
                            }
                        }
                        RetryDecision::GiveUp => return Err(BackendError::Network(msg)),
                    }
                }
            }
        }
    }

    /// Sleep for `delay`, but wake early (returning `false`) if cancelled.
    /// Retry waits are themselves suspension points that honor the
    /// cancellation handle (§5).
    async fn sleep_cancellable(
        &self,
        delay: Duration,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

enum AttemptError {
    Cancelled,
    Network(String),
    Validation(String),
    RemoteApi { status: u16, message: String },
    RateLimit { retry_after: Option<u64> },
    ServerError(u16),
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn query_model(&self, query: &BackendQuery) -> Result<BackendCompletion, BackendError> {
        let (resp, _elapsed_ms) = self.query_with_retry(query, None).await?;
        decode_completion(resp)
    }

    async fn query_structured(
        &self,
        query: &BackendQuery,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        let (resp, _elapsed_ms) = self.query_with_retry(query, Some(schema)).await?;
        let completion = decode_completion(resp)?;
        serde_json::from_str(&completion.content)
            .map_err(|e| BackendError::Validation(format!("structured output not valid JSON: {e}")))
    }

    async fn get_available_models(&self) -> Result<Vec<ModelCatalogEntry>, BackendError> {
        let url = format!("{}/models", self.base_url);
        let request = self.headers(self.client.get(&url));
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::RemoteApi { status, message });
        }

        let body: ModelsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Validation(format!("undecodable catalog body: {e}")))?;
        Ok(body.data)
    }
}

/// A 200 with no `choices[0].message.content` is a `Validation` error, not
/// retried (§4.1 edge cases). A 200 with `usage` absent yields success
/// without token counts (caller builds `ModelResponse` without `meta`).
fn decode_completion(resp: CompletionResponse) -> Result<BackendCompletion, BackendError> {
    let content = resp
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            BackendError::Validation("response had no choices[0].message.content".to_string())
        })?;

    let citations = resp
        .citations
        .map(|cs| cs.into_iter().map(Into::into).collect())
        .filter(|v: &Vec<_>| !v.is_empty());

    Ok(BackendCompletion {
        content,
        citations,
        prompt_tokens: resp.usage.as_ref().map(|u| u.prompt_tokens),
        completion_tokens: resp.usage.as_ref().map(|u| u.completion_tokens),
        total_tokens: resp.usage.as_ref().map(|u| u.total_tokens),
    })
}
