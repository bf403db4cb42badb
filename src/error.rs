use thiserror::Error;

/// Literal sentinel carried by a slot whose model was never queried because
/// a First-N race already settled without it. The exact text is part of the
/// contract: carry-through and downstream display both branch on it.
pub const FIRST_N_SENTINEL: &str = "Response not needed (first-n limit reached)";

/// Literal-prefix sentinel carried by a slot dropped by the time-limit filter.
/// Carry-through suppresses re-querying a model once it has this prefix.
pub const TIME_LIMIT_PREFIX: &str = "Filtered: exceeded time limit";

/// Literal sentinel for a synthesis attempt with no successful input to work from.
pub const NO_CONTENT_SENTINEL: &str = "No successful responses to synthesize";

/// Error taxonomy for a single model query. Every per-model failure is
/// materialized into this type and placed in a response slot — it never
/// propagates past the Backend Client's caller (§7 propagation policy).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("rate limited{}", retry_after_suffix(.retry_after_secs))]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    Validation(String),

    #[error("remote api error ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    #[error("request cancelled")]
    Cancelled,

    /// First-N sentinel, see [`FIRST_N_SENTINEL`]. Stored as a distinct
    /// variant (rather than matched against a catch-all string) so
    /// carry-through logic never has to parse error text except when
    /// formatting the final sentinel string.
    #[error("{}", FIRST_N_SENTINEL)]
    FirstNSentinel,

    /// Time-limit sentinel, see [`TIME_LIMIT_PREFIX`]. Carries the measured
    /// latency so the message can report "exceeded time limit (912ms > 500ms)".
    #[error("{}: {measured_ms}ms > {budget_ms}ms", TIME_LIMIT_PREFIX)]
    TimeLimit { measured_ms: u64, budget_ms: u64 },

    /// Synthesis-only: no successful responses existed to synthesize from.
    #[error("{}", NO_CONTENT_SENTINEL)]
    NoContent,
}

fn retry_after_suffix(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {secs}s)"),
        None => String::new(),
    }
}

impl BackendError {
    /// True for the two sentinels that carry-through must never re-query —
    /// firstN is an explicit "we didn't ask", time-limit is a post-hoc cull
    /// of a response that otherwise existed.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::FirstNSentinel | Self::TimeLimit { .. })
    }

    /// Exact sentinel text, matching the contractual strings in §7/§8 of
    /// the specification.
    pub fn sentinel_text(&self) -> String {
        match self {
            Self::FirstNSentinel => FIRST_N_SENTINEL.to_string(),
            Self::TimeLimit {
                measured_ms,
                budget_ms,
            } => format!("{TIME_LIMIT_PREFIX}: {measured_ms}ms > {budget_ms}ms"),
            Self::NoContent => NO_CONTENT_SENTINEL.to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors surfaced to the orchestrator's caller. Unlike [`BackendError`],
/// these are allowed to propagate — they cover catalog retrieval (the one
/// Backend Client operation that may fail outward) and config-level
/// validation problems.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("model catalog request failed: {0}")]
    Catalog(#[from] BackendError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Validation failures for a [`crate::config::RootConfig`] /
/// [`crate::config::CouncilConfig`]. Raised by `validate()`, never by serde
/// itself (serde only rejects unknown fields and type mismatches).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("models list must not be empty")]
    EmptyModels,

    #[error("rounds must be in 1..=10, got {0}")]
    RoundsOutOfRange(u32),

    #[error("temperature must be in 0.0..=2.0")]
    TemperatureOutOfRange,

    #[error("firstN ({first_n}) must be <= model count ({model_count})")]
    FirstNExceedsModels { first_n: usize, model_count: usize },

    #[error("timeLimit must be in 0.1..=300.0 seconds")]
    TimeLimitOutOfRange,

    #[error("defaultCouncil '{0}' does not name a declared council")]
    UnknownDefaultCouncil(String),
}
