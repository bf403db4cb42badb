//! Session Aggregator (§4.8): wires the Consensus Driver, Time-Limit
//! Filter, and Synthesizer Driver together, and computes summary metadata.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::BackendClient;
use crate::config::CouncilConfig;
use crate::consensus::{self, ProgressObserver, Stage};
use crate::error::ConfigError;
use crate::options::{PartialQueryOptions, QueryOptions};
use crate::pricing::PricingEstimator;
use crate::response::{ConsensusResponse, ModelResponse, RoundResult, SessionMetadata};
use crate::{fanout::FanOutTarget, message::Message, timelimit};

fn noop_observer(_round: u32, _model: &str, _stage: Stage) {}

/// Top-level entry point: holds a Backend Client and a Pricing Estimator,
/// and runs councils against it (§6.1 library surface).
pub struct Session {
    client: Arc<dyn BackendClient>,
    pricing: Arc<PricingEstimator>,
}

impl Session {
    pub fn new(client: Arc<dyn BackendClient>, pricing: PricingEstimator) -> Self {
        Self {
            client,
            pricing: Arc::new(pricing),
        }
    }

    /// Run a single, non-consensus round (`rounds == 1`, no synthesis) —
    /// the thin convenience path for a pure fan-out query, with no
    /// call-site overrides and an internally-owned cancellation handle.
    pub async fn query(
        &self,
        prompt: &str,
        council: &CouncilConfig,
    ) -> Result<RoundResult, ConfigError> {
        self.query_opts(
            prompt,
            council,
            &PartialQueryOptions::default(),
            CancellationToken::new(),
        )
        .await
    }

    /// Same as [`Self::query`], but accepts an explicit call-site override
    /// layer (the top tier of §4.8 step 1's precedence) and a
    /// caller-owned [`CancellationToken`] that can be fired externally —
    /// a user interrupt or shutdown signal — to abort in-flight requests (§5).
    pub async fn query_opts(
        &self,
        prompt: &str,
        council: &CouncilConfig,
        overrides: &PartialQueryOptions,
        cancel: CancellationToken,
    ) -> Result<RoundResult, ConfigError> {
        council.validate()?;
        let options = effective_options(council, overrides, cancel);
        let targets: Vec<FanOutTarget> = council
            .models
            .iter()
            .map(|m| FanOutTarget {
                model_id: m.model_id().to_string(),
                messages: vec![
                    Message::system(m.effective_system(council.system.as_deref())),
                    Message::user(prompt),
                ],
            })
            .collect();
        Ok(crate::fanout::query_all(&self.client, &self.pricing, &targets, &options).await)
    }

    /// Run the full deliberation described by `council`: N consensus
    /// rounds, time-limit filtering per round, and optional synthesis
    /// (§4.8 steps 1-4). No call-site overrides; the cancellation handle
    /// is internally owned and discarded when the call returns.
    pub async fn query_with_consensus(
        &self,
        prompt: &str,
        council: &CouncilConfig,
    ) -> Result<ConsensusResponse, ConfigError> {
        self.query_with_consensus_opts(
            prompt,
            council,
            &PartialQueryOptions::default(),
            CancellationToken::new(),
            &noop_observer,
        )
        .await
    }

    /// Same as [`Self::query_with_consensus`], but drives an observer
    /// through the Consensus Driver's per-model progress events (§5).
    pub async fn query_with_consensus_observed(
        &self,
        prompt: &str,
        council: &CouncilConfig,
        observer: &ProgressObserver<'_>,
    ) -> Result<ConsensusResponse, ConfigError> {
        self.query_with_consensus_opts(
            prompt,
            council,
            &PartialQueryOptions::default(),
            CancellationToken::new(),
            observer,
        )
        .await
    }

    /// The full documented entry point (§6.1): an explicit call-site
    /// override layer and a single cancellation handle, created once by
    /// the caller and threaded through every round and every model query
    /// in this deliberation. Firing `cancel` — a user interrupt, a
    /// shutdown signal — stops dispatch of further rounds; any round
    /// already in flight when it fires settles with `Cancelled` slots
    /// instead of completing normally (§5).
    pub async fn query_with_consensus_opts(
        &self,
        prompt: &str,
        council: &CouncilConfig,
        overrides: &PartialQueryOptions,
        cancel: CancellationToken,
        observer: &ProgressObserver<'_>,
    ) -> Result<ConsensusResponse, ConfigError> {
        council.validate()?;

        let options = effective_options(council, overrides, cancel);
        let total_rounds = effective_rounds(council, overrides);
        if !(1..=10).contains(&total_rounds) {
            return Err(ConfigError::RoundsOutOfRange(total_rounds));
        }
        let time_limit_ms = council.defaults.time_limit.map(|secs| (secs * 1000.0) as u64);

        let mut rounds: Vec<RoundResult> = Vec::with_capacity(total_rounds as usize);
        let mut previous: Option<RoundResult> = None;

        for round_number in 1..=total_rounds {
            let round = consensus::run_round(
                &self.client,
                &self.pricing,
                &council.models,
                council.system.as_deref(),
                prompt,
                previous.as_ref(),
                &options,
                round_number,
                observer,
            )
            .await;

            let round = match time_limit_ms {
                Some(budget) => {
                    let (filtered, dropped) = timelimit::apply(round, budget);
                    if !dropped.is_empty() {
                        tracing::info!(round = round_number, ?dropped, "time-limit filter dropped models");
                    }
                    filtered
                }
                None => round,
            };

            previous = Some(round.clone());
            let cancelled = options.cancel.is_cancelled();
            rounds.push(round);
            if cancelled {
                // Fired before or during this round: every remaining slot
                // is (or carries through as) `Cancelled`, and no further
                // round is worth dispatching (§5).
                break;
            }
        }

        let synthesis = if !options.cancel.is_cancelled() && council.defaults.single.unwrap_or(false) {
            let synthesizer = council.synthesizer_ref();
            Some(
                crate::synthesis::synthesize(
                    &self.client,
                    &self.pricing,
                    &synthesizer,
                    prompt,
                    &rounds,
                    &options,
                )
                .await,
            )
        } else {
            None
        };

        let metadata = compute_metadata(&rounds, synthesis.as_ref(), &self.pricing);

        Ok(ConsensusResponse {
            rounds,
            synthesis,
            metadata: Some(metadata),
        })
    }

    /// Retrieve the available model catalog from the Backend Client
    /// (§4.1 — the one client operation allowed to propagate a network
    /// failure outward).
    pub async fn get_available_models(&self) -> Result<Vec<String>, crate::error::BackendError> {
        let catalog = self.client.get_available_models().await?;
        Ok(catalog.into_iter().map(|entry| entry.id).collect())
    }

    /// Pure cost lookup, bypassing any network call (§4.2).
    pub fn estimate_cost(&self, model_id: &str, total_tokens: u64) -> f64 {
        self.pricing.estimate(model_id, total_tokens)
    }
}

fn effective_options(
    council: &CouncilConfig,
    call_site: &PartialQueryOptions,
    cancel: CancellationToken,
) -> QueryOptions {
    let base = QueryOptions {
        cancel,
        ..QueryOptions::default()
    }
    .merged_with(&council.defaults);
    base.merged_with(call_site)
}

/// Three-tier precedence for the round count (§4.8 step 1): an explicit
/// call-site override beats `council.defaults.rounds`, which beats the
/// council's own required `rounds` field.
fn effective_rounds(council: &CouncilConfig, call_site: &PartialQueryOptions) -> u32 {
    call_site
        .rounds
        .or(council.defaults.rounds)
        .unwrap_or(council.rounds)
}

/// §4.8 step 5's formulas, applied over every response in every round plus
/// the synthesis (if present).
fn compute_metadata(
    rounds: &[RoundResult],
    synthesis: Option<&ModelResponse>,
    pricing: &PricingEstimator,
) -> SessionMetadata {
    let mut total_cost = 0.0;
    let mut total_tokens: u64 = 0;
    let mut latency_sum: u64 = 0;
    let mut latency_count: u64 = 0;

    let all_responses = rounds
        .iter()
        .flat_map(|round| round.iter())
        .chain(synthesis.into_iter());

    for response in all_responses {
        if let Some(meta) = response.meta() {
            total_cost += if meta.estimated_cost > 0.0 {
                meta.estimated_cost
            } else {
                pricing.estimate(&response.model, meta.total_tokens)
            };
            total_tokens += meta.total_tokens;
            latency_sum += meta.latency_ms;
            latency_count += 1;
        }
    }

    let average_latency = if latency_count > 0 {
        latency_sum as f64 / latency_count as f64
    } else {
        0.0
    };

    SessionMetadata {
        total_cost,
        total_tokens,
        average_latency,
        model_count: rounds.first().map(|r| r.len()).unwrap_or(0),
    }
}
