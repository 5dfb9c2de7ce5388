use std::sync::Arc;

use anyhow::{Context, Result};
use aura_core::IntentClassifier;
use aura_gazetteer::{EntityExtractor, Gazetteer};
use aura_observability::AppMetrics;
use aura_providers::{
    HttpSpeechRecognizer, HttpSpeechSynthesizer, MobilityProviders, ProviderMode,
    SpeechRecognizer, SpeechSynthesizer, UnavailableSpeech,
};
use aura_storage::{AudioStore, Store};
use tracing::{info, warn};

use crate::config::PipelineSettings;
use crate::dispatcher::Dispatcher;
use crate::orchestrator::{PipelineParts, VoicePipeline};

/// Loads the read-only tables and wires every collaborator named by `settings`.
pub async fn build_pipeline(
    settings: &PipelineSettings,
    metrics: Arc<AppMetrics>,
) -> Result<VoicePipeline<Store>> {
    let gazetteer = Arc::new(match settings.gazetteer_dir.as_ref() {
        Some(dir) => Gazetteer::with_extensions(dir)
            .with_context(|| format!("failed loading gazetteer extensions from {}", dir.display()))?,
        None => Gazetteer::builtin().context("failed loading built-in gazetteer")?,
    });

    let classifier =
        Arc::new(IntentClassifier::with_default_rules().context("invalid intent rule table")?);
    let extractor = Arc::new(
        EntityExtractor::new(gazetteer.clone()).context("failed to initialize entity extractor")?,
    );

    let providers = match settings.providers {
        ProviderMode::Offline => MobilityProviders::offline(gazetteer.clone()),
        ProviderMode::Http => MobilityProviders::http(&settings.http)
            .context("failed to build mobility data clients")?,
    };

    let timeout = settings.speech.request_timeout;
    let recognizer: Arc<dyn SpeechRecognizer> = match settings.speech.stt_url.as_deref() {
        Some(url) => Arc::new(
            HttpSpeechRecognizer::new(url, timeout).context("failed to build STT client")?,
        ),
        None => Arc::new(UnavailableSpeech),
    };
    let synthesizer: Arc<dyn SpeechSynthesizer> = match settings.speech.tts_url.as_deref() {
        Some(url) => Arc::new(
            HttpSpeechSynthesizer::new(url, timeout).context("failed to build TTS client")?,
        ),
        None => Arc::new(UnavailableSpeech),
    };

    let mut options = settings.options.clone();
    if options.synthesis_enabled && settings.speech.tts_url.is_none() {
        warn!("no TTS engine configured, answering with text only");
        options.synthesis_enabled = false;
    }

    let store = match settings.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };

    info!(
        gazetteer_entries = gazetteer.len(),
        rules = classifier.rules().len(),
        providers = ?settings.providers,
        store = store.backend(),
        stt = settings.speech.stt_url.is_some(),
        tts = settings.speech.tts_url.is_some(),
        synthesis_enabled = options.synthesis_enabled,
        "voice pipeline ready"
    );

    let parts = PipelineParts {
        classifier,
        extractor,
        dispatcher: Dispatcher::new(
            providers,
            options.call_timeout,
            options.region,
        ),
        recognizer,
        synthesizer,
        store: Arc::new(store),
        audio: AudioStore::new(settings.audio_dir.clone()),
        metrics,
    };

    Ok(VoicePipeline::new(parts, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::Location;

    #[tokio::test]
    async fn offline_pipeline_answers_text_queries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = PipelineSettings::offline(dir.path());
        settings.options.synthesis_enabled = false;

        let pipeline = build_pipeline(&settings, AppMetrics::shared())
            .await
            .expect("pipeline");
        let result = pipeline
            .run_text(
                "¿Dónde está la parada de autobús más cercana?",
                Some(Location::new(39.4699, -0.3763)),
            )
            .await
            .expect("answered");

        assert!(result.reply_text.contains("Plaza del Ayuntamiento"));
        assert!(result.audio_reference.is_none());
    }

    #[tokio::test]
    async fn text_only_without_a_tts_engine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = PipelineSettings::offline(dir.path());
        assert!(settings.options.synthesis_enabled);

        let pipeline = build_pipeline(&settings, AppMetrics::shared())
            .await
            .expect("pipeline");
        assert!(!pipeline.options().synthesis_enabled);

        let result = pipeline
            .run_text(
                "¿Dónde está la parada de autobús más cercana?",
                Some(Location::new(39.4699, -0.3763)),
            )
            .await
            .expect("answered");

        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(result.audio_reference.is_none());
    }

    #[tokio::test]
    async fn voice_queries_without_an_engine_fail_recognition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = PipelineSettings::offline(dir.path());
        let pipeline = build_pipeline(&settings, AppMetrics::shared())
            .await
            .expect("pipeline");

        let error = pipeline
            .run(vec![0; 16], Location::new(39.4699, -0.3763))
            .await
            .expect_err("no stt");
        assert_eq!(error.code(), "recognition_failure");
    }
}
