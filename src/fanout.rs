//! Fan-Out Engine (§4.3) and First-N Selector (§4.4).
//!
//! Grounded on the teacher's `review.rs` straggler-cutoff executor: a
//! `tokio::task::JoinSet` tagged by index so results can be written back
//! into an order-preserving vector regardless of completion order, plus a
//! `tokio_util::sync::CancellationToken` threaded through every request.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::{build_meta, BackendClient, BackendQuery};
use crate::error::BackendError;
use crate::message::Message;
use crate::options::QueryOptions;
use crate::pricing::PricingEstimator;
use crate::response::{ModelResponse, RoundResult};

/// One model's fully-resolved query: its id and its own message list
/// (effective system prompt already substituted in by the caller —
/// see DESIGN.md for why Fan-Out takes per-model messages rather than one
/// shared list).
#[derive(Debug, Clone)]
pub struct FanOutTarget {
    pub model_id: String,
    pub messages: Vec<Message>,
}

/// Dispatch concurrent queries for every target and return an ordered
/// vector, one slot per input target, in input order (§4.3).
///
/// When `options.first_n` names a limit smaller than `targets.len()`,
/// delegates to the First-N race (§4.4); otherwise this is a plain
/// "wait for everyone" fan-out.
pub async fn query_all(
    client: &Arc<dyn BackendClient>,
    pricing: &Arc<PricingEstimator>,
    targets: &[FanOutTarget],
    options: &QueryOptions,
) -> RoundResult {
    match options.first_n {
        Some(n) if n < targets.len() => query_first_n(client, pricing, targets, options, n).await,
        _ => query_plain(client, pricing, targets, options).await,
    }
}

/// Plain fan-out: wait for every task to settle, independent of
/// completion order (§4.3 semantics, §5 ordering guarantees).
async fn query_plain(
    client: &Arc<dyn BackendClient>,
    pricing: &Arc<PricingEstimator>,
    targets: &[FanOutTarget],
    options: &QueryOptions,
) -> RoundResult {
    let mut set: JoinSet<(usize, ModelResponse)> = JoinSet::new();
    for (idx, target) in targets.iter().enumerate() {
        spawn_query(
            &mut set,
            idx,
            target,
            options,
            options.cancel.clone(),
            Arc::clone(client),
            Arc::clone(pricing),
        );
    }

    let mut slots: Vec<Option<ModelResponse>> = vec![None; targets.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, response)) => slots[idx] = Some(response),
            Err(join_err) => {
                tracing::error!("fan-out task panicked: {join_err}");
            }
        }
    }

    finalize_slots(slots, targets)
}

/// First-N race: resolve as soon as `first_n` slots have settled (success
/// or failure both count), cancel the rest, and fill their slots with the
/// exact sentinel string (§4.4, §8 invariant 4).
async fn query_first_n(
    client: &Arc<dyn BackendClient>,
    pricing: &Arc<PricingEstimator>,
    targets: &[FanOutTarget],
    options: &QueryOptions,
    first_n: usize,
) -> RoundResult {
    // Child token: cancelling it aborts only the stragglers of this race,
    // without marking the parent (external) handle as cancelled. If the
    // parent IS cancelled, children inherit that and each query surfaces a
    // real `Cancelled` error rather than the first-n sentinel.
    let race_token = options.cancel.child_token();

    let mut set: JoinSet<(usize, ModelResponse)> = JoinSet::new();
    for (idx, target) in targets.iter().enumerate() {
        spawn_query(
            &mut set,
            idx,
            target,
            options,
            race_token.clone(),
            Arc::clone(client),
            Arc::clone(pricing),
        );
    }

    let mut slots: Vec<Option<ModelResponse>> = vec![None; targets.len()];
    let mut settled = 0usize;

    while settled < first_n {
        match set.join_next().await {
            Some(Ok((idx, response))) => {
                slots[idx] = Some(response);
                settled += 1;
            }
            Some(Err(join_err)) => {
                tracing::error!("first-n task panicked: {join_err}");
            }
            None => break, // all tasks finished (can happen if first_n == targets.len())
        }
    }

    // Race concluded: cancel and drop the stragglers. JoinSet aborts all
    // remaining tasks on drop.
    race_token.cancel();
    drop(set);

    for (idx, slot) in slots.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(ModelResponse::from_backend_error(
                targets[idx].model_id.clone(),
                &BackendError::FirstNSentinel,
            ));
        }
    }

    finalize_slots(slots, targets)
}

fn spawn_query(
    set: &mut JoinSet<(usize, ModelResponse)>,
    idx: usize,
    target: &FanOutTarget,
    options: &QueryOptions,
    cancel: CancellationToken,
    client: Arc<dyn BackendClient>,
    pricing: Arc<PricingEstimator>,
) {
    let model_id = target.model_id.clone();
    let query = BackendQuery {
        model: model_id.clone(),
        messages: target.messages.clone(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        web_search: options.web_search.clone(),
        cancel,
    };

    set.spawn(async move {
        let start = Instant::now();
        let response = match client.query_model(&query).await {
            Ok(completion) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let meta = build_meta(&completion, latency_ms, &pricing, &model_id);
                match meta {
                    Some(meta) => ModelResponse::success_with_meta(
                        model_id,
                        completion.content,
                        completion.citations,
                        meta,
                    ),
                    None => ModelResponse {
                        model: model_id,
                        outcome: crate::response::Outcome::Success {
                            content: completion.content,
                            citations: completion.citations,
                            meta: None,
                        },
                    },
                }
            }
            Err(err) => ModelResponse::from_backend_error(model_id, &err),
        };
        (idx, response)
    });
}

fn finalize_slots(slots: Vec<Option<ModelResponse>>, targets: &[FanOutTarget]) -> RoundResult {
    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.unwrap_or_else(|| {
                ModelResponse::failure(
                    targets[idx].model_id.clone(),
                    "internal: slot never filled",
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Duration;

    use crate::backend::{BackendCompletion, ModelCatalogEntry};
    use crate::message::Message;
    use crate::options::QueryOptions;

    /// Deterministic mock matching the "Stub Backend Client" scenarios:
    /// each model id maps to either a fixed success (with an artificial
    /// delay) or a fixed error.
    struct MockClient {
        behaviors: HashMap<String, MockBehavior>,
        calls: Mutex<Vec<String>>,
    }

    #[derive(Clone)]
    enum MockBehavior {
        Success { content: String, delay: Duration },
        Error(BackendError),
    }

    impl MockClient {
        fn new(behaviors: HashMap<String, MockBehavior>) -> Self {
            Self {
                behaviors,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BackendClient for MockClient {
        async fn query_model(
            &self,
            query: &BackendQuery,
        ) -> Result<BackendCompletion, BackendError> {
            self.calls.lock().unwrap().push(query.model.clone());
            match self.behaviors.get(&query.model) {
                Some(MockBehavior::Success { content, delay }) => {
                    tokio::select! {
                        biased;
                        _ = query.cancel.cancelled() => Err(BackendError::Cancelled),
                        _ = tokio::time::sleep(*delay) => Ok(BackendCompletion {
                            content: content.clone(),
                            citations: None,
                            prompt_tokens: Some(10),
                            completion_tokens: Some(10),
                            total_tokens: Some(20),
                        }),
                    }
                }
                Some(MockBehavior::Error(e)) => Err(e.clone()),
                None => Err(BackendError::Validation("unconfigured model".to_string())),
            }
        }

        async fn get_available_models(&self) -> Result<Vec<ModelCatalogEntry>, BackendError> {
            Ok(vec![])
        }

        async fn query_structured(
            &self,
            _query: &BackendQuery,
            _schema: &serde_json::Value,
        ) -> Result<serde_json::Value, BackendError> {
            unimplemented!("not exercised by fan-out tests")
        }
    }

    fn targets(ids: &[&str]) -> Vec<FanOutTarget> {
        ids.iter()
            .map(|id| FanOutTarget {
                model_id: id.to_string(),
                messages: vec![Message::user("hello")],
            })
            .collect()
    }

    #[tokio::test]
    async fn preserves_input_order_regardless_of_completion_order() {
        let mut behaviors = HashMap::new();
        behaviors.insert(
            "slow".to_string(),
            MockBehavior::Success {
                content: "slow-reply".to_string(),
                delay: Duration::from_millis(40),
            },
        );
        behaviors.insert(
            "fast".to_string(),
            MockBehavior::Success {
                content: "fast-reply".to_string(),
                delay: Duration::from_millis(1),
            },
        );
        let client: Arc<dyn BackendClient> = Arc::new(MockClient::new(behaviors));
        let pricing = Arc::new(PricingEstimator::default());
        let options = QueryOptions::default();

        let result = query_all(&client, &pricing, &targets(&["slow", "fast"]), &options).await;

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].model, "slow");
        assert_eq!(result[1].model, "fast");
        assert_eq!(result[0].content(), Some("slow-reply"));
        assert_eq!(result[1].content(), Some("fast-reply"));
    }

    #[tokio::test]
    async fn error_isolation_does_not_sink_other_slots() {
        let mut behaviors = HashMap::new();
        behaviors.insert(
            "ok".to_string(),
            MockBehavior::Success {
                content: "fine".to_string(),
                delay: Duration::from_millis(1),
            },
        );
        behaviors.insert(
            "broken".to_string(),
            MockBehavior::Error(BackendError::RemoteApi {
                status: 500,
                message: "boom".to_string(),
            }),
        );
        let client: Arc<dyn BackendClient> = Arc::new(MockClient::new(behaviors));
        let pricing = Arc::new(PricingEstimator::default());
        let options = QueryOptions::default();

        let result = query_all(&client, &pricing, &targets(&["ok", "broken"]), &options).await;

        assert!(result[0].is_success());
        assert!(!result[1].is_success());
    }

    #[tokio::test]
    async fn first_n_exactness_fills_remaining_slots_with_sentinel() {
        let mut behaviors = HashMap::new();
        for id in ["a", "b", "c"] {
            behaviors.insert(
                id.to_string(),
                MockBehavior::Success {
                    content: format!("{id}-reply"),
                    delay: Duration::from_millis(if id == "c" { 200 } else { 1 }),
                },
            );
        }
        let client: Arc<dyn BackendClient> = Arc::new(MockClient::new(behaviors));
        let pricing = Arc::new(PricingEstimator::default());
        let mut options = QueryOptions::default();
        options.first_n = Some(2);

        let result = query_all(&client, &pricing, &targets(&["a", "b", "c"]), &options).await;

        let sentinel_count = result.iter().filter(|r| r.is_carry_through_error()).count();
        let settled_count = result.len() - sentinel_count;
        assert_eq!(settled_count, 2);
        assert_eq!(sentinel_count, 1);
        // "c" was the slow one; it should be the one left holding the sentinel.
        assert_eq!(result[2].model, "c");
        assert!(result[2].is_carry_through_error());
    }

    #[tokio::test]
    async fn first_n_equal_to_model_count_behaves_like_plain_fanout() {
        let mut behaviors = HashMap::new();
        behaviors.insert(
            "only".to_string(),
            MockBehavior::Success {
                content: "reply".to_string(),
                delay: Duration::from_millis(1),
            },
        );
        let client: Arc<dyn BackendClient> = Arc::new(MockClient::new(behaviors));
        let pricing = Arc::new(PricingEstimator::default());
        let mut options = QueryOptions::default();
        options.first_n = Some(1);

        let result = query_all(&client, &pricing, &targets(&["only"]), &options).await;
        assert_eq!(result.len(), 1);
        assert!(result[0].is_success());
    }
}
