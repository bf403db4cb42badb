//! A library for running prompts against a council of LLM backends: fanning
//! a prompt out to every model, optionally iterating consensus rounds,
//! filtering stragglers against a wall-clock budget, and synthesizing a
//! final answer (see SPEC_FULL.md for the full contract).

pub mod backend;
pub mod config;
pub mod consensus;
pub mod error;
pub mod fanout;
pub mod message;
pub mod options;
pub mod pricing;
pub mod response;
pub mod session;
pub mod synthesis;
pub mod timelimit;

pub use backend::{BackendClient, HttpBackendClient};
pub use config::{CouncilConfig, GatewayConfig, RootConfig};
pub use error::{BackendError, ConfigError, OrchestratorError};
pub use message::{Message, ModelRef, Role};
pub use options::{ContextSize, PartialQueryOptions, QueryOptions, WebSearch};
pub use pricing::{PricingEstimator, PricingTable};
pub use response::{ConsensusResponse, ModelResponse, ResponseMeta, RoundResult, SessionMetadata};
pub use session::Session;
pub use tokio_util::sync::CancellationToken;
