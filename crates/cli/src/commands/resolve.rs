//! `introute resolve` — Run one utterance through the engine.

use chrono::Utc;
use introute_config::EngineConfig;
use introute_core::routing::CallContext;

use crate::wiring;

pub async fn run(
    template_id: String,
    utterance: String,
    offline: bool,
    stt_confidence: Option<f32>,
    audio_ref: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let engine = wiring::build_engine(&config, offline).await?;

    let mut ctx = CallContext::new(
        format!("cli-{}", Utc::now().timestamp_millis()),
        template_id,
    );
    ctx.transcription_confidence = stt_confidence;
    ctx.audio_ref = audio_ref;

    let result = engine.resolve(&utterance, &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    // Give the detached learning task a moment to land before exit.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    Ok(())
}
