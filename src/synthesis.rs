//! Synthesizer Driver (§4.7): given the full round-by-round transcript,
//! constructs a single compound prompt and queries one designated model
//! for a unified answer.

use std::sync::Arc;
use std::time::Instant;

use crate::backend::{build_meta, BackendClient, BackendQuery};
use crate::error::BackendError;
use crate::message::{Message, ModelRef};
use crate::options::QueryOptions;
use crate::pricing::PricingEstimator;
use crate::response::{ModelResponse, RoundResult};

const SYNTHESIZER_SYSTEM: &str = "You are an expert synthesizer. Provide clear, direct answers based on the information given. Never mention the synthesis process or multiple sources.";

const CLOSING_DIRECTIVE: &str = "Do not mention the council, multiple perspectives, or synthesis process. Simply answer the question as if you are providing the definitive response.";

/// Run the Synthesizer Driver against a completed (and time-limit-filtered)
/// transcript. `rounds` must be non-empty.
pub async fn synthesize(
    client: &Arc<dyn BackendClient>,
    pricing: &Arc<PricingEstimator>,
    synthesizer: &ModelRef,
    initial_prompt: &str,
    rounds: &[RoundResult],
    options: &QueryOptions,
) -> ModelResponse {
    let final_round = rounds.last().expect("synthesize requires at least one round");
    let successful: Vec<&ModelResponse> = final_round.iter().filter(|r| r.is_success()).collect();

    if successful.is_empty() {
        return ModelResponse::from_backend_error(synthesizer.model_id(), &BackendError::NoContent);
    }

    let compound = if rounds.len() == 1 {
        build_expert_perspectives(&successful)
    } else {
        build_full_discussion(rounds)
    };

    let user_prompt = format!(
        "Original question: {initial_prompt}\n\n{compound}\n\n{CLOSING_DIRECTIVE}"
    );

    let messages = vec![
        Message::system(SYNTHESIZER_SYSTEM),
        Message::user(user_prompt),
    ];

    let query = BackendQuery {
        model: synthesizer.model_id().to_string(),
        messages,
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        web_search: None,
        cancel: options.cancel.clone(),
    };

    let start = Instant::now();
    match client.query_model(&query).await {
        Ok(completion) => {
            let latency_ms = start.elapsed().as_millis() as u64;
            let meta = build_meta(&completion, latency_ms, pricing, synthesizer.model_id());
            match meta {
                Some(meta) => ModelResponse::success_with_meta(
                    synthesizer.model_id(),
                    completion.content,
                    completion.citations,
                    meta,
                ),
                None => ModelResponse {
                    model: synthesizer.model_id().to_string(),
                    outcome: crate::response::Outcome::Success {
                        content: completion.content,
                        citations: completion.citations,
                        meta: None,
                    },
                },
            }
        }
        Err(err) => ModelResponse::from_backend_error(synthesizer.model_id(), &err),
    }
}

/// R == 1 compound: "Perspective 1:\n...\nPerspective 2:\n..." over the
/// successful slots of the single round, in council order.
fn build_expert_perspectives(successful: &[&ModelResponse]) -> String {
    let mut out = String::from("Expert Perspectives:\n\n");
    for (i, response) in successful.iter().enumerate() {
        out.push_str(&format!(
            "Perspective {}:\n{}\n\n",
            i + 1,
            response.content().unwrap_or_default()
        ));
    }
    out
}

/// R > 1 compound: "Full Council Discussion", enumerating each round and
/// each non-error response as `Elder {i+1}` where `i` is the model's
/// council position (not its position among only the successful
/// responses) — errored elders are skipped entirely (§4.7, and the
/// redesign decision in SPEC_FULL.md unifying Elder numbering on council
/// index regardless of round).
fn build_full_discussion(rounds: &[RoundResult]) -> String {
    let mut out = String::from("Full Council Discussion:\n\n");
    for (round_idx, round) in rounds.iter().enumerate() {
        out.push_str(&format!("Round {}:\n", round_idx + 1));
        for (i, response) in round.iter().enumerate() {
            if let Some(content) = response.content() {
                out.push_str(&format!("Elder {}:\n{content}\n\n", i + 1));
            }
        }
    }
    out
}
