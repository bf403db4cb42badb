//! Time-Limit Filter (§4.6): a post-hoc cull of successful responses whose
//! measured latency exceeds a per-round wall-clock budget. Never shortens
//! an in-flight request — the Backend Client already finished before this
//! runs.

use crate::error::BackendError;
use crate::response::{ModelResponse, RoundResult};

/// Apply the filter to one round. `time_limit_ms` is the budget for this
/// round; responses without `meta` are kept (insufficient information to
/// reject), error responses are always kept.
///
/// Returns the filtered round plus the list of model ids that were
/// dropped, for the caller to log (§4.6 "Log the set of dropped model ids").
pub fn apply(round: RoundResult, time_limit_ms: u64) -> (RoundResult, Vec<String>) {
    let mut dropped = Vec::new();
    let filtered = round
        .into_iter()
        .map(|response| match response.meta() {
            Some(meta) if meta.latency_ms > time_limit_ms => {
                dropped.push(response.model.clone());
                ModelResponse::from_backend_error(
                    response.model.clone(),
                    &BackendError::TimeLimit {
                        measured_ms: meta.latency_ms,
                        budget_ms: time_limit_ms,
                    },
                )
            }
            _ => response,
        })
        .collect();
    (filtered, dropped)
}
