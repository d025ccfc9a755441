//! Shared construction of the engine and its stores from config.

use std::sync::Arc;
use std::time::Duration;

use introute_config::EngineConfig;
use introute_core::alert::Notifier;
use introute_core::store::{ScenarioStore, SuggestionStore};
use introute_engine::Engine;
use introute_learning::LearningPromoter;
use introute_monitor::CostAndHealthMonitor;
use introute_router::pricing::ModelPricing;
use introute_router::{OpenAiCompatProvider, PricingTable, Tier3Router};
use introute_store::{InMemoryScenarioStore, InMemorySuggestionStore, SqliteStore};

use crate::notify::LogNotifier;

type BoxError = Box<dyn std::error::Error>;

/// Open the configured store backend.
pub async fn open_stores(
    config: &EngineConfig,
) -> Result<(Arc<dyn ScenarioStore>, Arc<dyn SuggestionStore>), BoxError> {
    match config.store.backend.as_str() {
        "memory" => Ok((
            Arc::new(InMemoryScenarioStore::new()),
            Arc::new(InMemorySuggestionStore::new()),
        )),
        _ => {
            let store = Arc::new(SqliteStore::new(&config.store.path).await?);
            Ok((store.clone(), store))
        }
    }
}

/// Build a fully wired engine.
pub async fn build_engine(config: &EngineConfig, offline: bool) -> Result<Engine, BoxError> {
    let (scenarios, suggestions) = open_stores(config).await?;
    build_engine_with(config, offline, scenarios, suggestions)
}

/// Build an engine over already-open stores.
pub fn build_engine_with(
    config: &EngineConfig,
    offline: bool,
    scenarios: Arc<dyn ScenarioStore>,
    suggestions: Arc<dyn SuggestionStore>,
) -> Result<Engine, BoxError> {
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let monitor = Arc::new(CostAndHealthMonitor::new(notifier.clone()));

    let mut engine = Engine::new(scenarios.clone(), monitor);

    if !offline {
        if config.transcription.enabled {
            tracing::warn!(
                "transcription.enabled is set but no transcription provider is built in; ignoring"
            );
        }
        let provider = build_provider(config)?;
        let pricing = PricingTable::with_defaults();
        for (model, custom) in &config.custom_pricing {
            pricing.set(model, ModelPricing::new(custom.input_per_m, custom.output_per_m));
        }

        let tier3 = Tier3Router::new(provider, &config.provider.model)
            .with_pricing(pricing)
            .with_timeout(Duration::from_secs(config.provider.timeout_secs));
        let promoter = LearningPromoter::new(scenarios, suggestions, notifier);

        engine = engine
            .with_tier3(Arc::new(tier3))
            .with_promoter(Arc::new(promoter));
    }

    Ok(engine)
}

fn build_provider(config: &EngineConfig) -> Result<Arc<OpenAiCompatProvider>, BoxError> {
    let key = config.provider.api_key.clone();
    let provider = match config.provider.kind.as_str() {
        "ollama" => OpenAiCompatProvider::ollama(config.provider.api_url.as_deref())?,
        kind => {
            let key = key.ok_or_else(|| {
                format!("no API key configured for provider '{kind}' (set INTROUTE_API_KEY)")
            })?;
            match (&config.provider.api_url, kind) {
                (Some(url), _) => OpenAiCompatProvider::new(kind, url, key)?,
                (None, "openai") => OpenAiCompatProvider::openai(key)?,
                _ => OpenAiCompatProvider::openrouter(key)?,
            }
        }
    };
    Ok(Arc::new(provider))
}
