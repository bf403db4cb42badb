//! Speaks the chat-completion wire protocol to a single remote gateway
//! (§4.1 Backend Client). `BackendClient` is a trait so the orchestrator
//! can be driven against a deterministic mock in tests without a network.

mod client;
mod retry;
pub(crate) mod wire;

pub use client::{BackendClient, HttpBackendClient};
pub use wire::ModelCatalogEntry;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;
use crate::message::Message;
use crate::response::{Citation, ResponseMeta};

/// Everything the Backend Client needs to issue one completion call,
/// independent of how the caller phrased it (§3 QueryOptions).
#[derive(Debug, Clone)]
pub struct BackendQuery {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: Option<u64>,
    pub web_search: Option<crate::options::WebSearch>,
    pub cancel: CancellationToken,
}

/// The decoded result of one successful completion call, before the
/// orchestrator attaches latency/cost (those are measured by the caller,
/// not the client — §3 "latencyMs measured by the orchestrator").
#[derive(Debug, Clone)]
pub struct BackendCompletion {
    pub content: String,
    pub citations: Option<Vec<Citation>>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Query one model with a message list. Never returns `Err` for
    /// per-model failures in normal operation at the orchestrator layer —
    /// here at the client layer it does return `Err(BackendError)`, and
    /// the caller (Fan-Out Engine) is responsible for capturing it into a
    /// response slot rather than propagating it (§4.1, §7).
    async fn query_model(
        &self,
        query: &BackendQuery,
    ) -> Result<BackendCompletion, BackendError>;

    /// Retrieve the catalog of available models. The only Backend Client
    /// operation allowed to propagate a network failure to the caller.
    async fn get_available_models(&self) -> Result<Vec<ModelCatalogEntry>, BackendError>;

    /// Optional structured-output generation against a declared JSON
    /// schema (§4.9). Returns the parsed JSON value on success; a
    /// malformed/non-JSON body is a `Validation` error.
    async fn query_structured(
        &self,
        query: &BackendQuery,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError>;
}

/// Turn a [`ResponseMeta`]-shaped tuple of raw token counts into a full
/// `ResponseMeta`, applying the Pricing Estimator. Shared by the Fan-Out
/// Engine and Synthesizer Driver so cost accounting is computed in one
/// place (§4.8 step 5 reuses the same rule when `estimatedCost` is absent).
pub fn build_meta(
    completion: &BackendCompletion,
    latency_ms: u64,
    pricing: &crate::pricing::PricingEstimator,
    model: &str,
) -> Option<ResponseMeta> {
    let total_tokens = completion.total_tokens?;
    let prompt_tokens = completion.prompt_tokens.unwrap_or(0);
    let completion_tokens = completion.completion_tokens.unwrap_or(0);
    let estimated_cost = pricing.estimate(model, total_tokens);
    Some(ResponseMeta {
        prompt_tokens,
        completion_tokens,
        total_tokens,
        latency_ms,
        estimated_cost,
    })
}
