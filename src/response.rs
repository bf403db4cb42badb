use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// A web-search citation attached to a successful response (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub start_index: usize,
    pub end_index: usize,
}

/// Token usage and cost accounting attached to a successful response.
/// `latency_ms` is measured by the orchestrator, never reported by the
/// backend (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub latency_ms: u64,
    pub estimated_cost: f64,
}

/// A single model's response in a round. Exactly one of `content`/`error`
/// is meaningful (§3 invariants) — represented as an enum so the invalid
/// "both present" / "neither present" states cannot be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(untagged)]
pub enum Outcome {
    Success {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        citations: Option<Vec<Citation>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<ResponseMeta>,
    },
    Failure {
        error: String,
    },
}

impl ModelResponse {
    pub fn success(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            outcome: Outcome::Success {
                content: content.into(),
                citations: None,
                meta: None,
            },
        }
    }

    pub fn success_with_meta(
        model: impl Into<String>,
        content: impl Into<String>,
        citations: Option<Vec<Citation>>,
        meta: ResponseMeta,
    ) -> Self {
        Self {
            model: model.into(),
            outcome: Outcome::Success {
                content: content.into(),
                citations,
                meta: Some(meta),
            },
        }
    }

    pub fn failure(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            outcome: Outcome::Failure {
                error: error.into(),
            },
        }
    }

    pub fn from_backend_error(model: impl Into<String>, err: &BackendError) -> Self {
        Self::failure(model, err.sentinel_text())
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn content(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { content, .. } => Some(content),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failure { error } => Some(error),
            Outcome::Success { .. } => None,
        }
    }

    pub fn meta(&self) -> Option<&ResponseMeta> {
        match &self.outcome {
            Outcome::Success { meta, .. } => meta.as_ref(),
            Outcome::Failure { .. } => None,
        }
    }

    /// True for the two sentinel error strings carry-through treats as
    /// "already settled, don't re-query" (§4.5 carry-through rule).
    pub fn is_carry_through_error(&self) -> bool {
        match self.error() {
            Some(e) => {
                e == crate::error::FIRST_N_SENTINEL
                    || e.starts_with(crate::error::TIME_LIMIT_PREFIX)
            }
            None => false,
        }
    }
}

/// An ordered vector of [`ModelResponse`], one slot per council model, in
/// council order (§3 RoundResult).
pub type RoundResult = Vec<ModelResponse>;

/// Aggregate metadata for a finished session (§3, §4.8 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub total_cost: f64,
    pub total_tokens: u64,
    pub average_latency: f64,
    pub model_count: usize,
}

/// The full result of a deliberation: every round, an optional synthesis,
/// and summary metadata (§3 ConsensusResponse).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResponse {
    pub rounds: Vec<RoundResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<ModelResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SessionMetadata>,
}

impl ConsensusResponse {
    /// Derived "any success" signal for CLI-style exit-code translation
    /// (§7 exit signaling): true iff at least one slot in the final round
    /// has content.
    pub fn any_success(&self) -> bool {
        self.rounds
            .last()
            .map(|round| round.iter().any(ModelResponse::is_success))
            .unwrap_or(false)
    }
}
