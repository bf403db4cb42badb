//! Maps a (model-id, token-usage) pair to an estimated monetary cost (§4.2).
//! Pure, deterministic, no network — externalized as data with a built-in
//! fallback, per §9 "Pricing table".

use serde::{Deserialize, Serialize};

/// One `(pattern, rate)` entry. Rate is "cost per 1000 tokens, total".
/// Kept as a `Vec` rather than a `HashMap` so declaration order is
/// preserved — substring-match ambiguity is resolved by first-match-wins
/// (§4.2 "Iteration order"), which a hash container cannot guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateEntry {
    pub pattern: String,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    pub default_rate: f64,
    pub models: Vec<RateEntry>,
    pub patterns: Vec<RateEntry>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::built_in()
    }
}

impl PricingTable {
    /// Built-in fallback table used when no external pricing file is
    /// supplied, or the caller prefers not to load one (§9).
    pub fn built_in() -> Self {
        Self {
            default_rate: 0.002,
            models: vec![
                RateEntry {
                    pattern: "gpt-4o-mini".to_string(),
                    rate: 0.00015,
                },
                RateEntry {
                    pattern: "gpt-4o".to_string(),
                    rate: 0.0025,
                },
                RateEntry {
                    pattern: "gpt-5".to_string(),
                    rate: 0.005,
                },
                RateEntry {
                    pattern: "claude-3-5-sonnet".to_string(),
                    rate: 0.003,
                },
                RateEntry {
                    pattern: "claude-3-opus".to_string(),
                    rate: 0.015,
                },
                RateEntry {
                    pattern: "gemini-1.5-pro".to_string(),
                    rate: 0.00125,
                },
                RateEntry {
                    pattern: "deepseek".to_string(),
                    rate: 0.00055,
                },
            ],
            patterns: vec![
                RateEntry {
                    pattern: "free".to_string(),
                    rate: 0.0,
                },
                RateEntry {
                    pattern: "mini".to_string(),
                    rate: 0.0005,
                },
                RateEntry {
                    pattern: "turbo".to_string(),
                    rate: 0.001,
                },
                RateEntry {
                    pattern: "pro".to_string(),
                    rate: 0.0015,
                },
            ],
        }
    }

    /// Load a pricing table from a TOML file. Falls back to the built-in
    /// table on any read/parse error (logged, not propagated — pricing
    /// data is an optimization, never load-bearing for correctness).
    pub fn load_or_default(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(table) => table,
                Err(e) => {
                    tracing::warn!("failed to parse pricing table at {path:?}: {e}, using built-in");
                    Self::built_in()
                }
            },
            Err(e) => {
                tracing::debug!("no pricing table at {path:?} ({e}), using built-in");
                Self::built_in()
            }
        }
    }
}

/// Pure function over an immutable rate table (§4.2 contract).
pub struct PricingEstimator {
    table: PricingTable,
}

impl PricingEstimator {
    pub fn new(table: PricingTable) -> Self {
        Self { table }
    }

    /// Rule order, first match wins (§4.2):
    /// 1. exact-fragment match against `models`
    /// 2. pattern match against `patterns`
    /// 3. `defaultRate`
    pub fn rate_for(&self, model_id: &str) -> f64 {
        let lower = model_id.to_lowercase();
        for entry in &self.table.models {
            if lower.contains(&entry.pattern.to_lowercase()) {
                return entry.rate;
            }
        }
        for entry in &self.table.patterns {
            if lower.contains(&entry.pattern.to_lowercase()) {
                return entry.rate;
            }
        }
        self.table.default_rate
    }

    /// `estimate(modelId, {totalTokens}) -> real`. Cost = (totalTokens /
    /// 1000) * rate.
    pub fn estimate(&self, model_id: &str, total_tokens: u64) -> f64 {
        (total_tokens as f64 / 1000.0) * self.rate_for(model_id)
    }
}

impl Default for PricingEstimator {
    fn default() -> Self {
        Self::new(PricingTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_fragment_wins_over_pattern_and_default() {
        let est = PricingEstimator::default();
        // "gpt-4o-mini" matches the exact models-table fragment before the
        // "mini" pattern entry gets a chance.
        assert_eq!(est.rate_for("openai/gpt-4o-mini"), 0.00015);
    }

    #[test]
    fn pattern_matches_when_no_exact_fragment() {
        let est = PricingEstimator::default();
        assert_eq!(est.rate_for("some-vendor/widget-turbo"), 0.001);
    }

    #[test]
    fn default_rate_is_the_fallback() {
        let est = PricingEstimator::default();
        assert_eq!(est.rate_for("totally-unknown-model"), 0.002);
    }

    #[test]
    fn cost_is_non_negative_and_zero_at_zero_tokens() {
        let est = PricingEstimator::default();
        assert_eq!(est.estimate("anything", 0), 0.0);
        assert!(est.estimate("anything", 1000) >= 0.0);
    }

    #[test]
    fn declaration_order_breaks_substring_ambiguity() {
        // Two keys can both substring-match "super-pro-max"; whichever is
        // declared first in `models` wins, not a hash-container order.
        let table = PricingTable {
            default_rate: 0.002,
            models: vec![
                RateEntry {
                    pattern: "pro".to_string(),
                    rate: 0.01,
                },
                RateEntry {
                    pattern: "pro-max".to_string(),
                    rate: 0.02,
                },
            ],
            patterns: vec![],
        };
        let est = PricingEstimator::new(table);
        assert_eq!(est.rate_for("super-pro-max"), 0.01);
    }

    #[test]
    fn swapping_declaration_order_changes_the_result() {
        let table = PricingTable {
            default_rate: 0.002,
            models: vec![
                RateEntry {
                    pattern: "pro-max".to_string(),
                    rate: 0.02,
                },
                RateEntry {
                    pattern: "pro".to_string(),
                    rate: 0.01,
                },
            ],
            patterns: vec![],
        };
        let est = PricingEstimator::new(table);
        assert_eq!(est.rate_for("super-pro-max"), 0.02);
    }
}
