use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Web-search augmentation selection (§3 QueryOptions, §4.1 wire behavior).
/// Absent means no augmentation; the other two variants select the
/// canonical encoding documented in SPEC_FULL.md §9 — plugin form for a
/// result-count budget, native form for a context-size hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebSearch {
    Enabled,
    MaxResults { max_results: u32 },
    SearchContextSize { search_context_size: ContextSize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSize {
    Low,
    Medium,
    High,
}

/// Default number of results requested by the plugin web-search form when
/// the caller asks for `webSearch: enabled` without a count (§4.1).
pub const DEFAULT_WEB_SEARCH_RESULTS: u32 = 5;

/// Bundle of per-call options carried through the orchestrator (§3).
/// `cancel` is not `Clone`-derived alongside the rest via `#[derive]`
/// because `CancellationToken` clones cheaply (it's an `Arc` internally)
/// but is not serializable — this type is never round-tripped through JSON.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub temperature: f64,
    pub max_tokens: Option<u64>,
    pub cancel: CancellationToken,
    pub web_search: Option<WebSearch>,
    pub first_n: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            cancel: CancellationToken::new(),
            web_search: None,
            first_n: None,
        }
    }
}

impl QueryOptions {
    /// Apply precedence explicit-call-site > council.defaults > built-ins,
    /// per §4.8 step 1. `self` is the council's defaults already merged
    /// with built-ins; `override_opts` is the narrower, more specific layer.
    pub fn merged_with(&self, override_opts: &PartialQueryOptions) -> Self {
        Self {
            temperature: override_opts.temperature.unwrap_or(self.temperature),
            max_tokens: override_opts.max_tokens.or(self.max_tokens),
            cancel: self.cancel.clone(),
            web_search: override_opts
                .web_search
                .clone()
                .or_else(|| self.web_search.clone()),
            first_n: override_opts.first_n.or(self.first_n),
        }
    }
}

/// Sparse override layer — every field optional, used both for
/// `CouncilConfig.defaults` and for an explicit call-site override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialQueryOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub web_search: Option<WebSearch>,
    pub first_n: Option<usize>,
    /// Enable synthesis after the final round (§3 CouncilConfig.defaults.single).
    pub single: Option<bool>,
    /// Per-round wall-clock budget in seconds for the Time-Limit Filter (§4.6).
    pub time_limit: Option<f64>,
    /// Override for the number of consensus rounds to run, read by
    /// `Session::effective_rounds` ahead of `CouncilConfig.rounds` (§4.8 step 1).
    pub rounds: Option<u32>,
}
