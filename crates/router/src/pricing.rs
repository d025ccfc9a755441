//! Per-model pricing for deterministic Tier-3 cost accounting.
//!
//! Prices are in USD per 1 million tokens. Cost is computed from the
//! provider-reported token counts, never estimated from text length.

use introute_core::provider::Usage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        prices.insert(
            "anthropic/claude-3.5-sonnet".into(),
            ModelPricing::new(3.0, 15.0),
        );
        prices.insert(
            "anthropic/claude-3.5-haiku".into(),
            ModelPricing::new(0.8, 4.0),
        );
        prices.insert(
            "anthropic/claude-3-haiku".into(),
            ModelPricing::new(0.25, 1.25),
        );

        prices.insert("openai/gpt-4o".into(), ModelPricing::new(2.5, 10.0));
        prices.insert("openai/gpt-4o-mini".into(), ModelPricing::new(0.15, 0.6));
        prices.insert("openai/o3-mini".into(), ModelPricing::new(1.1, 4.4));

        prices.insert(
            "google/gemini-2.0-flash".into(),
            ModelPricing::new(0.1, 0.4),
        );
        prices.insert(
            "google/gemini-1.5-flash".into(),
            ModelPricing::new(0.075, 0.3),
        );

        prices.insert("mistral/mistral-small".into(), ModelPricing::new(0.2, 0.6));
        prices.insert("deepseek/deepseek-v3".into(), ModelPricing::new(0.27, 1.1));

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap();
        prices.insert(model.into(), pricing);
    }

    /// Compute cost for a model call, returning 0.0 if model is not in table.
    ///
    /// Supports flexible matching: exact match first, then common
    /// provider prefixes (`gpt-4o-mini` → `openai/gpt-4o-mini`), then
    /// bare-name prefix matching so versioned response names like
    /// `gpt-4o-mini-2024-07-18` still resolve.
    pub fn compute_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let prices = self.prices.read().unwrap();

        if let Some(p) = prices.get(model) {
            return p.cost(input_tokens, output_tokens);
        }

        let prefixed_names = [
            format!("openai/{model}"),
            format!("anthropic/{model}"),
            format!("google/{model}"),
            format!("mistral/{model}"),
            format!("deepseek/{model}"),
        ];
        for name in &prefixed_names {
            if let Some(p) = prices.get(name.as_str()) {
                return p.cost(input_tokens, output_tokens);
            }
        }

        let model_lower = model.to_lowercase();
        let bare_model = model_lower.split('/').next_back().unwrap_or(&model_lower);

        let mut best: Option<(&str, &ModelPricing)> = None;
        for (key, pricing) in prices.iter() {
            let bare_key = key.split('/').next_back().unwrap_or(key);
            if bare_model.starts_with(&bare_key.to_lowercase())
                && best.is_none_or(|(b, _)| bare_key.len() > b.len())
            {
                best = Some((bare_key, pricing));
            }
        }

        best.map_or(0.0, |(_, p)| p.cost(input_tokens, output_tokens))
    }

    /// Cost of a completed call from its reported usage.
    pub fn cost_of(&self, model: &str, usage: Usage) -> f64 {
        self.compute_cost(model, usage.prompt_tokens, usage.completion_tokens)
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.read().unwrap().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();
        // gpt-4o-mini: $0.15/M input, $0.6/M output
        let cost = table.compute_cost("openai/gpt-4o-mini", 1000, 500);
        assert!((cost - (1000.0 * 0.15 + 500.0 * 0.6) / 1_000_000.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_returns_zero() {
        let table = PricingTable::with_defaults();
        assert!((table.compute_cost("unknown/model-xyz", 1000, 500) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn bare_name_resolves_via_prefix() {
        let table = PricingTable::with_defaults();
        let direct = table.compute_cost("openai/gpt-4o-mini", 1000, 500);
        let bare = table.compute_cost("gpt-4o-mini", 1000, 500);
        let versioned = table.compute_cost("gpt-4o-mini-2024-07-18", 1000, 500);
        assert!((direct - bare).abs() < 1e-12);
        assert!((direct - versioned).abs() < 1e-12);
    }

    #[test]
    fn cost_is_deterministic_from_usage() {
        let table = PricingTable::with_defaults();
        let usage = Usage {
            prompt_tokens: 420,
            completion_tokens: 80,
        };
        let a = table.cost_of("openai/gpt-4o-mini", usage);
        let b = table.cost_of("openai/gpt-4o-mini", usage);
        assert!((a - b).abs() < 1e-15);
        assert!(a > 0.0);
    }

    #[test]
    fn custom_pricing_overrides() {
        let table = PricingTable::empty();
        assert!(table.is_empty());
        table.set("custom/model", ModelPricing::new(1.0, 2.0));
        let cost = table.compute_cost("custom/model", 1_000_000, 1_000_000);
        assert!((cost - 3.0).abs() < 1e-12);
        assert_eq!(table.len(), 1);
    }
}
