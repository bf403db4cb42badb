use serde::{Deserialize, Serialize};

/// Hard-coded fallback system prompt used when neither a model's own
/// override nor the council's shared system prompt is set.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful, knowledgeable assistant participating in a multi-model deliberation.";

/// A message role. Ordered the way a completion request carries them:
/// `system` first, then alternating `user`/`assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a completion request. The body is opaque text —
/// the orchestrator never inspects its content beyond prompt construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Either a bare model id, or a model id paired with a per-model system
/// prompt override. Kept as a tagged variant with two cases (§9 Design
/// Notes) rather than an `Option`-laden struct, so `modelId` and
/// `effectiveSystem` are total functions with no invalid states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelRef {
    Bare(String),
    WithOverride {
        #[serde(rename = "model")]
        model_id: String,
        #[serde(rename = "system")]
        system_override: String,
    },
}

impl ModelRef {
    pub fn bare(model_id: impl Into<String>) -> Self {
        Self::Bare(model_id.into())
    }

    /// The model id, regardless of variant. Anonymization (§3 invariants)
    /// never touches this — it is a pure accessor.
    pub fn model_id(&self) -> &str {
        match self {
            Self::Bare(id) => id,
            Self::WithOverride { model_id, .. } => model_id,
        }
    }

    /// The effective system prompt for this model: its own override if
    /// present, else the council's system prompt, else the hard-coded
    /// default (§3 ModelRef).
    pub fn effective_system<'a>(&'a self, council_system: Option<&'a str>) -> &'a str {
        match self {
            Self::WithOverride {
                system_override, ..
            } => system_override,
            Self::Bare(_) => council_system.unwrap_or(DEFAULT_SYSTEM_PROMPT),
        }
    }
}
