use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::message::ModelRef;
use crate::options::PartialQueryOptions;

/// Default synthesizer model, used when [`CouncilConfig::synthesizer`] is unset (§3).
pub const DEFAULT_SYNTHESIZER_MODEL: &str = "openai/gpt-4o-mini";

/// A single council's configuration (§3 CouncilConfig).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CouncilConfig {
    pub models: Vec<ModelRef>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub synthesizer: Option<ModelRef>,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default)]
    pub defaults: PartialQueryOptions,
}

fn default_rounds() -> u32 {
    1
}

impl CouncilConfig {
    /// Validate the range/shape invariants named throughout the
    /// specification: non-empty models, rounds in 1..=10, temperature in
    /// 0..=2, firstN <= model count, timeLimit in 0.1..=300 seconds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::EmptyModels);
        }
        if !(1..=10).contains(&self.rounds) {
            return Err(ConfigError::RoundsOutOfRange(self.rounds));
        }
        if let Some(t) = self.defaults.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::TemperatureOutOfRange);
        }
        if let Some(n) = self.defaults.first_n
            && n > self.models.len()
        {
            return Err(ConfigError::FirstNExceedsModels {
                first_n: n,
                model_count: self.models.len(),
            });
        }
        if let Some(t) = self.defaults.time_limit
            && !(0.1..=300.0).contains(&t)
        {
            return Err(ConfigError::TimeLimitOutOfRange);
        }
        Ok(())
    }

    /// The resolved synthesizer model ref: the configured one, or the
    /// fixed low-cost default (§4.7).
    pub fn synthesizer_ref(&self) -> ModelRef {
        self.synthesizer
            .clone()
            .unwrap_or_else(|| ModelRef::bare(DEFAULT_SYNTHESIZER_MODEL))
    }
}

/// Root configuration: a single council plus optionally a named bank of
/// councils (§6 Configuration shape). `#[serde(deny_unknown_fields)]`
/// rejects extra/unknown fields loudly at the boundary, per §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RootConfig {
    #[serde(flatten)]
    pub council: CouncilConfig,
    #[serde(default)]
    pub councils: Option<HashMap<String, CouncilConfig>>,
    #[serde(default)]
    pub default_council: Option<String>,
}

impl RootConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.council.validate()?;
        if let Some(councils) = &self.councils {
            for cfg in councils.values() {
                cfg.validate()?;
            }
        }
        if let Some(name) = &self.default_council
            && !self
                .councils
                .as_ref()
                .is_some_and(|m| m.contains_key(name))
        {
            return Err(ConfigError::UnknownDefaultCouncil(name.clone()));
        }
        Ok(())
    }

    /// Resolve the council named by `default_council`, or fall back to the
    /// top-level council when no bank/default is set.
    pub fn resolve_council(&self, name: Option<&str>) -> Option<&CouncilConfig> {
        let name = name.or(self.default_council.as_deref());
        match name {
            Some(n) => self.councils.as_ref().and_then(|m| m.get(n)),
            None => Some(&self.council),
        }
    }
}

/// Connection details for a single backend gateway (§6 Environment):
/// the bearer key comes from `OPENROUTER_API_KEY` and no other
/// environment variable is consulted by the core.
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub referer: String,
    pub title: String,
}

impl GatewayConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://openrouter.ai/api/v1";

    /// Read the bearer key from `OPENROUTER_API_KEY`. Returns `None` if unset
    /// — the caller decides whether that is fatal.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("OPENROUTER_API_KEY").ok()?;
        Some(Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            api_key,
            referer: "https://github.com/conclave".to_string(),
            title: "Conclave".to_string(),
        })
    }
}
