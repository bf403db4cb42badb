//! Consensus Driver (§4.5): rounds the council through Round 1 (a straight
//! fan-out) and, for R>1, revision rounds where each model sees its own
//! prior answer plus its non-errored peers'.

use std::sync::Arc;

use crate::backend::BackendClient;
use crate::fanout::{self, FanOutTarget};
use crate::message::{Message, ModelRef};
use crate::options::QueryOptions;
use crate::pricing::PricingEstimator;
use crate::response::{ModelResponse, RoundResult};

/// Progress events an optional observer receives while a round is in
/// flight. Ordering is per-model and strictly monotonic
/// (`Preparing` → `Querying` → `Complete`); no cross-model ordering is
/// guaranteed (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preparing,
    Querying,
    Complete,
}

/// Called once per `(round, model_id, stage)` transition. A no-op observer
/// (`|_, _, _| {}`) is the default when the caller doesn't care.
pub type ProgressObserver<'a> = dyn Fn(u32, &str, Stage) + Send + Sync + 'a;

/// Fixed revision-prompt template (§4.5). Peer iteration follows council
/// order, excludes the model's own slot, and excludes errored peers.
fn build_consensus_prompt(peers: &[(&str, &str)]) -> String {
    let mut prompt = String::from("Consider your peers' views and revise your response if needed:\n\n");
    for (model, content) in peers {
        prompt.push_str(&format!("**{model}**:\n{content}\n\n"));
    }
    prompt.push_str("Based on these perspectives, would you like to revise or expand your answer?");
    prompt
}

/// Run `rounds` consensus rounds for `models` against `initial_prompt`.
/// Each returned `RoundResult` is exactly as the Consensus Driver produced
/// it — callers apply the Time-Limit Filter (§4.6) themselves between
/// rounds, since the driver only knows about consensus mechanics.
#[allow(clippy::too_many_arguments)]
pub async fn run_round(
    client: &Arc<dyn BackendClient>,
    pricing: &Arc<PricingEstimator>,
    models: &[ModelRef],
    council_system: Option<&str>,
    initial_prompt: &str,
    previous_round: Option<&RoundResult>,
    options: &QueryOptions,
    round_number: u32,
    observer: &ProgressObserver<'_>,
) -> RoundResult {
    match previous_round {
        None => run_first_round(client, pricing, models, council_system, initial_prompt, options, observer).await,
        Some(prev) => {
            run_revision_round(
                client,
                pricing,
                models,
                council_system,
                initial_prompt,
                prev,
                options,
                round_number,
                observer,
            )
            .await
        }
    }
}

async fn run_first_round(
    client: &Arc<dyn BackendClient>,
    pricing: &Arc<PricingEstimator>,
    models: &[ModelRef],
    council_system: Option<&str>,
    initial_prompt: &str,
    options: &QueryOptions,
    observer: &ProgressObserver<'_>,
) -> RoundResult {
    let targets: Vec<FanOutTarget> = models
        .iter()
        .map(|m| {
            observer(1, m.model_id(), Stage::Preparing);
            FanOutTarget {
                model_id: m.model_id().to_string(),
                messages: vec![
                    Message::system(m.effective_system(council_system)),
                    Message::user(initial_prompt),
                ],
            }
        })
        .collect();

    for t in &targets {
        observer(1, &t.model_id, Stage::Querying);
    }
    let result = fanout::query_all(client, pricing, &targets, options).await;
    for r in &result {
        observer(1, &r.model, Stage::Complete);
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn run_revision_round(
    client: &Arc<dyn BackendClient>,
    pricing: &Arc<PricingEstimator>,
    models: &[ModelRef],
    council_system: Option<&str>,
    initial_prompt: &str,
    previous_round: &RoundResult,
    options: &QueryOptions,
    round_number: u32,
    observer: &ProgressObserver<'_>,
) -> RoundResult {
    // Carry-through: a slot already in error stays in error, without a
    // network call, and never reaches the fan-out (§4.5).
    let mut carried: Vec<Option<ModelResponse>> = vec![None; models.len()];
    let mut pending_targets: Vec<(usize, FanOutTarget)> = Vec::new();

    for (idx, model) in models.iter().enumerate() {
        let model_id = model.model_id();
        observer(round_number, model_id, Stage::Preparing);
        let prior = &previous_round[idx];

        if !prior.is_success() {
            carried[idx] = Some(prior.clone());
            observer(round_number, model_id, Stage::Complete);
            continue;
        }

        let peers: Vec<(&str, &str)> = models
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != idx)
            .filter_map(|(j, peer)| {
                let peer_response = &previous_round[j];
                peer_response
                    .content()
                    .map(|content| (peer.model_id(), content))
            })
            .collect();

        let messages = vec![
            Message::system(model.effective_system(council_system)),
            Message::user(initial_prompt),
            Message::assistant(prior.content().unwrap_or_default()),
            Message::user(build_consensus_prompt(&peers)),
        ];

        pending_targets.push((
            idx,
            FanOutTarget {
                model_id: model_id.to_string(),
                messages,
            },
        ));
    }

    for (idx, _) in &pending_targets {
        observer(round_number, models[*idx].model_id(), Stage::Querying);
    }

    // First-N is not re-applied past round 1 (§4.5 "Dispatch"): the set of
    // models queried this round is fixed, so we run the plain fan-out
    // regardless of `options.first_n`.
    let mut fanout_options = options.clone();
    fanout_options.first_n = None;

    let targets: Vec<FanOutTarget> = pending_targets.iter().map(|(_, t)| t.clone()).collect();
    let fanned = fanout::query_all(client, pricing, &targets, &fanout_options).await;

    for ((idx, _), response) in pending_targets.iter().zip(fanned.into_iter()) {
        observer(round_number, models[*idx].model_id(), Stage::Complete);
        carried[*idx] = Some(response);
    }

    carried
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.unwrap_or_else(|| {
                ModelResponse::failure(models[idx].model_id(), "internal: consensus slot never filled")
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCompletion, BackendQuery, ModelCatalogEntry};
    use crate::error::BackendError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct RecordingClient {
        replies: HashMap<String, String>,
        seen_prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl BackendClient for RecordingClient {
        async fn query_model(
            &self,
            query: &BackendQuery,
        ) -> Result<BackendCompletion, BackendError> {
            let last_user_message = query
                .messages
                .iter()
                .rev()
                .find(|m| m.role == crate::message::Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.seen_prompts
                .lock()
                .unwrap()
                .push((query.model.clone(), last_user_message));
            let content = self
                .replies
                .get(&query.model)
                .cloned()
                .unwrap_or_else(|| "default".to_string());
            Ok(BackendCompletion {
                content,
                citations: None,
                prompt_tokens: Some(5),
                completion_tokens: Some(5),
                total_tokens: Some(10),
            })
        }

        async fn get_available_models(&self) -> Result<Vec<ModelCatalogEntry>, BackendError> {
            Ok(vec![])
        }

        async fn query_structured(
            &self,
            _query: &BackendQuery,
            _schema: &serde_json::Value,
        ) -> Result<serde_json::Value, BackendError> {
            unimplemented!()
        }
    }

    fn noop_observer(_round: u32, _model: &str, _stage: Stage) {}

    #[tokio::test]
    async fn round_one_is_a_straight_fanout() {
        let mut replies = HashMap::new();
        replies.insert("a".to_string(), "a-says".to_string());
        replies.insert("b".to_string(), "b-says".to_string());
        let client: Arc<dyn BackendClient> = Arc::new(RecordingClient {
            replies,
            seen_prompts: Mutex::new(vec![]),
        });
        let pricing = Arc::new(PricingEstimator::default());
        let models = vec![ModelRef::bare("a"), ModelRef::bare("b")];
        let options = QueryOptions::default();

        let round1 = run_round(
            &client,
            &pricing,
            &models,
            None,
            "what is rust?",
            None,
            &options,
            1,
            &noop_observer,
        )
        .await;

        assert_eq!(round1.len(), 2);
        assert_eq!(round1[0].content(), Some("a-says"));
        assert_eq!(round1[1].content(), Some("b-says"));
    }

    #[tokio::test]
    async fn revision_round_excludes_self_and_errored_peers() {
        let mut replies = HashMap::new();
        replies.insert("a".to_string(), "a-revised".to_string());
        let client: Arc<dyn BackendClient> = Arc::new(RecordingClient {
            replies,
            seen_prompts: Mutex::new(vec![]),
        });
        let pricing = Arc::new(PricingEstimator::default());
        let models = vec![
            ModelRef::bare("a"),
            ModelRef::bare("b"),
            ModelRef::bare("c"),
        ];
        let options = QueryOptions::default();

        let previous = vec![
            ModelResponse::success("a", "a-prior"),
            ModelResponse::success("b", "b-prior"),
            ModelResponse::failure("c", "boom"),
        ];

        let round2 = run_round(
            &client,
            &pricing,
            &models,
            None,
            "what is rust?",
            Some(&previous),
            &options,
            2,
            &noop_observer,
        )
        .await;

        assert_eq!(round2[0].content(), Some("a-revised"));
        // carried through without a network call
        assert!(!round2[2].is_success());
        assert_eq!(round2[2].error(), Some("boom"));
    }

    #[tokio::test]
    async fn carried_through_error_slot_skips_network_call() {
        let client: Arc<dyn BackendClient> = Arc::new(RecordingClient {
            replies: HashMap::new(),
            seen_prompts: Mutex::new(vec![]),
        });
        let pricing = Arc::new(PricingEstimator::default());
        let models = vec![ModelRef::bare("a")];
        let options = QueryOptions::default();

        let previous = vec![ModelResponse::failure("a", "already dead")];

        let round2 = run_round(
            &client,
            &pricing,
            &models,
            None,
            "prompt",
            Some(&previous),
            &options,
            2,
            &noop_observer,
        )
        .await;

        assert_eq!(round2[0].error(), Some("already dead"));
    }
}
