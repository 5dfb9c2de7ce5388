use std::sync::Arc;
use std::time::Instant;

use aura_core::{
    clarification_reply, compose_reply, ClassificationResult, DispatchOutcome, EntitySet,
    FailureKind, Intent, IntentClassifier, Location, NotFoundReason, QueryError, QueryStage,
    QueryWarning, RecognizedUtterance, VoiceQueryRecord, VoiceQueryResult,
};
use aura_gazetteer::EntityExtractor;
use aura_observability::AppMetrics;
use aura_providers::{SpeechError, SpeechRecognizer, SpeechSynthesizer};
use aura_storage::{AudioStore, LookupCache, QueryLogRepository};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineOptions;
use crate::dispatcher::{cache_key, cache_ttl, Dispatcher};

/// Collaborators a pipeline is assembled from.
pub struct PipelineParts<S> {
    pub classifier: Arc<IntentClassifier>,
    pub extractor: Arc<EntityExtractor>,
    pub dispatcher: Dispatcher,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub store: Arc<S>,
    pub audio: AudioStore,
    pub metrics: Arc<AppMetrics>,
}

/// Answer of a direct (non-voice) data lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupReply {
    pub outcome: DispatchOutcome,
    pub reply_text: String,
}

/// Path through the query state machine. Illegal transitions are logged and ignored.
#[derive(Debug, Clone)]
struct StageTrace {
    stages: Vec<QueryStage>,
}

impl StageTrace {
    fn new() -> Self {
        Self {
            stages: vec![QueryStage::Received],
        }
    }

    fn current(&self) -> QueryStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(QueryStage::Received)
    }

    fn advance(&mut self, next: QueryStage) {
        let current = self.current();
        if current.can_advance_to(next) {
            debug!(from = ?current, to = ?next, "query stage");
            self.stages.push(next);
        } else {
            warn!(from = ?current, to = ?next, "ignored illegal query stage transition");
        }
    }
}

#[derive(Clone)]
pub struct VoicePipeline<S>
where
    S: QueryLogRepository + LookupCache,
{
    classifier: Arc<IntentClassifier>,
    extractor: Arc<EntityExtractor>,
    dispatcher: Dispatcher,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    store: Arc<S>,
    audio: AudioStore,
    metrics: Arc<AppMetrics>,
    options: PipelineOptions,
    permits: Arc<Semaphore>,
}

impl<S> VoicePipeline<S>
where
    S: QueryLogRepository + LookupCache,
{
    pub fn new(parts: PipelineParts<S>, options: PipelineOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent_queries.max(1)));
        Self {
            classifier: parts.classifier,
            extractor: parts.extractor,
            dispatcher: parts.dispatcher,
            recognizer: parts.recognizer,
            synthesizer: parts.synthesizer,
            store: parts.store,
            audio: parts.audio,
            metrics: parts.metrics,
            options,
            permits,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn audio(&self) -> &AudioStore {
        &self.audio
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    /// Full voice query. Fails only on an invalid caller location (checked
    /// before any engine call) or when speech recognition is unusable.
    #[instrument(skip(self, audio), fields(audio_bytes = audio.len()))]
    pub async fn run(
        &self,
        audio: Vec<u8>,
        caller: Location,
    ) -> Result<VoiceQueryResult, QueryError> {
        let started = Instant::now();
        let caller = self.options.region.validate(caller.lat, caller.lon)?;
        let _permit = self.permits.acquire().await.ok();

        let mut trace = StageTrace::new();
        let transcription = tokio::time::timeout(
            self.options.call_timeout,
            self.recognizer.transcribe(audio, self.options.language.clone()),
        )
        .await
        .unwrap_or(Err(SpeechError::Timeout(self.options.call_timeout)));

        let utterance = match transcription {
            Ok(utterance) => utterance,
            Err(error) => {
                trace.advance(QueryStage::Failed);
                self.metrics.inc_recognition_failure();
                warn!(error = %error, "speech recognition failed");
                return Err(QueryError::RecognitionFailure(error.to_string()));
            }
        };
        trace.advance(QueryStage::Transcribed);

        Ok(self.answer(utterance, Some(caller), trace, started).await)
    }

    /// Text query: the same chain without speech recognition.
    #[instrument(skip(self, text))]
    pub async fn run_text(
        &self,
        text: &str,
        caller: Option<Location>,
    ) -> Result<VoiceQueryResult, QueryError> {
        let started = Instant::now();
        let caller = caller
            .map(|at| self.options.region.validate(at.lat, at.lon))
            .transpose()?;
        let _permit = self.permits.acquire().await.ok();

        let mut trace = StageTrace::new();
        let text = text.trim();
        let utterance = RecognizedUtterance::new(
            text,
            self.options.language.clone(),
            if text.is_empty() { 0.0 } else { 1.0 },
        );
        trace.advance(QueryStage::Transcribed);

        Ok(self.answer(utterance, caller, trace, started).await)
    }

    /// One dispatcher route with already-structured entities, served from the
    /// lookup cache when possible.
    pub async fn lookup(
        &self,
        intent: Intent,
        entities: &EntitySet,
        caller: Option<Location>,
    ) -> LookupReply {
        let outcome = self.dispatch_cached(intent, entities, caller).await;
        self.record_outcome_metrics(&outcome);
        LookupReply {
            reply_text: compose_reply(intent, entities, &outcome),
            outcome,
        }
    }

    async fn answer(
        &self,
        utterance: RecognizedUtterance,
        caller: Option<Location>,
        mut trace: StageTrace,
        started: Instant,
    ) -> VoiceQueryResult {
        let classification = if utterance.is_unrecognized() {
            ClassificationResult::unknown()
        } else {
            self.classifier.classify(&utterance.text)
        };
        trace.advance(QueryStage::Classified);
        self.metrics.inc_query(classification.intent.as_str());

        let mut warnings = Vec::new();
        let mut entities = EntitySet::new();
        let mut outcome = None;

        let reply_text = if classification.confidence < self.options.confidence_threshold {
            trace.advance(QueryStage::LowConfidence);
            warnings.push(QueryWarning::LowConfidenceClassification {
                confidence: classification.confidence,
            });
            self.metrics.inc_clarification();
            trace.advance(QueryStage::Clarifying);
            clarification_reply()
        } else {
            entities = self
                .extractor
                .extract(&utterance.text, classification.intent, caller);
            trace.advance(QueryStage::Extracted);

            let dispatched = self
                .dispatch_cached(classification.intent, &entities, caller)
                .await;
            trace.advance(QueryStage::Dispatched);
            self.record_outcome_metrics(&dispatched);
            warnings.extend(warnings_for(&dispatched));

            let reply = compose_reply(classification.intent, &entities, &dispatched);
            trace.advance(QueryStage::Composed);
            outcome = Some(dispatched);
            reply
        };

        let query_id = Uuid::new_v4().to_string();
        let audio_reference = if self.options.synthesis_enabled {
            match self.synthesize(&reply_text).await {
                Ok(reference) => {
                    trace.advance(QueryStage::Synthesized);
                    Some(reference)
                }
                Err(detail) => {
                    self.metrics.inc_synthesis_failure();
                    warn!(query_id = %query_id, detail = %detail, "reply synthesis failed, returning text only");
                    warnings.push(QueryWarning::SynthesisFailure(detail));
                    None
                }
            }
        } else {
            None
        };
        trace.advance(QueryStage::Done);

        let elapsed = started.elapsed();
        self.metrics.observe_latency(elapsed);

        let result = VoiceQueryResult {
            query_id,
            recognized_text: utterance.text,
            language: utterance.language,
            intent: classification.intent,
            confidence: classification.confidence,
            matched_pattern_id: classification.matched_pattern_id,
            entities,
            outcome,
            reply_text,
            audio_reference,
            elapsed_ms: elapsed.as_millis() as u64,
            warnings: warnings.iter().map(ToString::to_string).collect(),
            stages: trace.stages,
        };

        info!(
            query_id = %result.query_id,
            intent = %result.intent,
            confidence = result.confidence,
            elapsed_ms = result.elapsed_ms,
            warnings = result.warnings.len(),
            "voice query answered"
        );

        let record = VoiceQueryRecord {
            result: result.clone(),
            caller_location: caller,
            created_at: Utc::now(),
        };
        if let Err(error) = self.store.record(&record).await {
            warn!(query_id = %result.query_id, error = %error, "failed to persist query log");
        }

        result
    }

    async fn synthesize(&self, text: &str) -> Result<String, String> {
        let audio = tokio::time::timeout(
            self.options.call_timeout,
            self.synthesizer
                .synthesize(text.to_string(), self.options.language.clone()),
        )
        .await
        .unwrap_or(Err(SpeechError::Timeout(self.options.call_timeout)))
        .map_err(|error| error.to_string())?;

        self.audio
            .save(&audio.bytes, &audio.extension)
            .await
            .map_err(|error| error.to_string())
    }

    async fn dispatch_cached(
        &self,
        intent: Intent,
        entities: &EntitySet,
        caller: Option<Location>,
    ) -> DispatchOutcome {
        let Some(ttl) = cache_ttl(intent) else {
            return self.dispatcher.dispatch(intent, entities, caller).await;
        };

        let key = cache_key(intent, entities, caller);
        let now = Utc::now();
        match self.store.get(&key, now).await {
            Ok(Some(value)) => match serde_json::from_value::<DispatchOutcome>(value) {
                Ok(outcome) => {
                    self.metrics.inc_cache_hit();
                    debug!(key = %key, "lookup served from cache");
                    return outcome;
                }
                Err(error) => warn!(key = %key, error = %error, "discarding unreadable cache entry"),
            },
            Ok(None) => {}
            Err(error) => warn!(key = %key, error = %error, "lookup cache unavailable"),
        }

        let outcome = self.dispatcher.dispatch(intent, entities, caller).await;
        if outcome.is_success() {
            match serde_json::to_value(&outcome) {
                Ok(value) => {
                    if let Err(error) = self.store.put(&key, value, now + ttl).await {
                        warn!(key = %key, error = %error, "failed to cache lookup");
                    }
                }
                Err(error) => warn!(key = %key, error = %error, "failed to serialize lookup"),
            }
        }
        outcome
    }

    fn record_outcome_metrics(&self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::ExternalFailure { cause } => {
                self.metrics.inc_external_failure(cause.source.as_str());
            }
            DispatchOutcome::Degraded { cause, .. } => {
                self.metrics.inc_degraded();
                self.metrics.inc_external_failure(cause.source.as_str());
            }
            DispatchOutcome::Success { .. } | DispatchOutcome::NotFound { .. } => {}
        }
    }
}

/// One warning per recoverable condition the outcome carries.
pub fn warnings_for(outcome: &DispatchOutcome) -> Vec<QueryWarning> {
    match outcome {
        DispatchOutcome::Success { .. } => Vec::new(),
        DispatchOutcome::NotFound {
            reason: NotFoundReason::MissingParameter(kind),
        } => vec![QueryWarning::MissingEntity(*kind)],
        DispatchOutcome::NotFound { .. } => Vec::new(),
        DispatchOutcome::ExternalFailure { cause } => vec![match cause.kind {
            FailureKind::Timeout => QueryWarning::ExternalTimeout(cause.source),
            FailureKind::Unreachable => QueryWarning::ExternalUnavailable(cause.source),
        }],
        DispatchOutcome::Degraded { cause, .. } => vec![QueryWarning::PartialAnswer(cause.source)],
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakeProviders, FakeRecognizer, FakeSynthesizer, Script, SpeechScript};
    use aura_core::{BoundingRegion, DispatchPayload, EntityKind, EntityValue};
    use aura_gazetteer::Gazetteer;
    use aura_storage::MemoryStore;

    const CALLER: Location = Location {
        lat: 39.4699,
        lon: -0.3763,
    };

    struct Harness {
        pipeline: VoicePipeline<MemoryStore>,
        providers: FakeProviders,
        recognizer: FakeRecognizer,
        synthesizer: FakeSynthesizer,
        _audio_dir: tempfile::TempDir,
    }

    fn harness(
        providers: FakeProviders,
        recognizer: FakeRecognizer,
        synthesizer: FakeSynthesizer,
    ) -> Harness {
        let audio_dir = tempfile::tempdir().expect("tempdir");
        let gazetteer = Arc::new(Gazetteer::builtin().expect("gazetteer"));
        let options = PipelineOptions {
            call_timeout: Duration::from_millis(50),
            ..PipelineOptions::default()
        };

        let pipeline = VoicePipeline::new(
            PipelineParts {
                classifier: Arc::new(IntentClassifier::with_default_rules().expect("rules")),
                extractor: Arc::new(EntityExtractor::new(gazetteer).expect("extractor")),
                dispatcher: Dispatcher::new(
                    providers.providers(),
                    options.call_timeout,
                    BoundingRegion::valencia(),
                ),
                recognizer: Arc::new(recognizer.clone()),
                synthesizer: Arc::new(synthesizer.clone()),
                store: Arc::new(MemoryStore::new()),
                audio: AudioStore::new(audio_dir.path()),
                metrics: AppMetrics::shared(),
            },
            options,
        );

        Harness {
            pipeline,
            providers,
            recognizer,
            synthesizer,
            _audio_dir: audio_dir,
        }
    }

    fn hearing(text: &str) -> Harness {
        harness(
            FakeProviders::default(),
            FakeRecognizer::hearing(text, 0.92),
            FakeSynthesizer::new(SpeechScript::Answer),
        )
    }

    #[tokio::test]
    async fn nearest_stop_voice_query_end_to_end() {
        let h = hearing("¿Dónde está la parada de autobús más cercana?");
        let result = h.pipeline.run(vec![0; 64], CALLER).await.expect("answered");

        assert_eq!(result.intent, Intent::NearestStop);
        assert!(result.confidence >= 0.9);
        assert!(matches!(
            result.outcome,
            Some(DispatchOutcome::Success {
                payload: DispatchPayload::Stops(_)
            })
        ));
        assert!(result.reply_text.contains("Plaza del Ayuntamiento"));
        assert!(result.reply_text.contains("metros"));
        assert!(result.warnings.is_empty());
        assert_eq!(
            result.stages,
            vec![
                QueryStage::Received,
                QueryStage::Transcribed,
                QueryStage::Classified,
                QueryStage::Extracted,
                QueryStage::Dispatched,
                QueryStage::Composed,
                QueryStage::Synthesized,
                QueryStage::Done,
            ]
        );

        let reference = result.audio_reference.clone().expect("audio reference");
        let stored = h.pipeline.audio().load(&reference).await.expect("load");
        assert_eq!(stored, Some(result.reply_text.clone().into_bytes()));

        let logged = h.pipeline.store().recent(5).await.expect("recent");
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].result.query_id, result.query_id);
        assert_eq!(logged[0].caller_location, Some(CALLER));
    }

    #[tokio::test]
    async fn traffic_without_zone_asks_which_zone() {
        let h = hearing("cómo está el tráfico");
        let result = h.pipeline.run(vec![1], CALLER).await.expect("answered");

        assert_eq!(result.intent, Intent::TrafficStatus);
        assert_eq!(
            result.outcome,
            Some(DispatchOutcome::missing(EntityKind::Zone))
        );
        assert!(result.reply_text.contains("zona"));
        assert_eq!(result.warnings, vec!["missing_entity:zone".to_string()]);
        assert_eq!(h.providers.calls(), 0);
    }

    #[tokio::test]
    async fn routing_timeout_apologizes_with_one_warning() {
        let h = harness(
            FakeProviders {
                router: Script::Hang,
                ..FakeProviders::default()
            },
            FakeRecognizer::hearing("cómo llego al mercado central", 0.9),
            FakeSynthesizer::new(SpeechScript::Answer),
        );
        let result = h.pipeline.run(vec![1], CALLER).await.expect("answered");

        assert_eq!(result.intent, Intent::Route);
        assert!(matches!(
            result.outcome,
            Some(DispatchOutcome::ExternalFailure { .. })
        ));
        assert!(result.reply_text.starts_with("Lo siento"));
        assert!(result.reply_text.contains("cálculo de rutas"));
        assert_eq!(result.warnings, vec!["external_timeout:routing".to_string()]);
        assert_eq!(h.pipeline.metrics().snapshot().external_failures_total, 1);
    }

    #[tokio::test]
    async fn gibberish_gets_clarification_without_dispatch() {
        let h = hearing("blorf quintaplex zazu");
        let result = h.pipeline.run(vec![1], CALLER).await.expect("answered");

        assert_eq!(result.intent, Intent::Unknown);
        assert!(result.confidence < 0.5);
        assert_eq!(result.reply_text, clarification_reply());
        assert!(result.outcome.is_none());
        assert!(result.entities.is_empty());
        assert!(result.stages.contains(&QueryStage::Clarifying));
        assert!(!result.stages.contains(&QueryStage::Extracted));
        assert_eq!(h.providers.calls(), 0);
        assert_eq!(h.pipeline.metrics().snapshot().clarifications_total, 1);
    }

    #[tokio::test]
    async fn location_outside_region_fails_before_any_engine_call() {
        let h = hearing("¿Dónde está la parada más cercana?");
        let error = h
            .pipeline
            .run(vec![1], Location::new(0.0, 0.0))
            .await
            .expect_err("rejected");

        assert_eq!(error, QueryError::InvalidLocation { lat: 0.0, lon: 0.0 });
        assert_eq!(error.code(), "invalid_location");
        assert_eq!(h.recognizer.calls(), 0);
        assert_eq!(h.synthesizer.calls(), 0);
    }

    #[tokio::test]
    async fn recognition_failure_is_fatal() {
        for script in [SpeechScript::Unavailable, SpeechScript::Hang] {
            let h = harness(
                FakeProviders::default(),
                FakeRecognizer::failing(script),
                FakeSynthesizer::new(SpeechScript::Answer),
            );
            let error = h.pipeline.run(vec![1], CALLER).await.expect_err("fatal");
            assert_eq!(error.code(), "recognition_failure");
            assert!(h.pipeline.store().recent(1).await.expect("recent").is_empty());
            assert_eq!(h.synthesizer.calls(), 0);
        }
    }

    #[tokio::test]
    async fn silent_audio_is_a_clarification_not_a_failure() {
        let h = harness(
            FakeProviders::default(),
            FakeRecognizer::hearing("", 0.0),
            FakeSynthesizer::new(SpeechScript::Answer),
        );
        let result = h.pipeline.run(vec![1], CALLER).await.expect("answered");
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.reply_text, clarification_reply());
    }

    #[tokio::test]
    async fn synthesis_failure_returns_text_only() {
        let h = harness(
            FakeProviders::default(),
            FakeRecognizer::hearing("hola", 0.9),
            FakeSynthesizer::new(SpeechScript::Unavailable),
        );
        let result = h.pipeline.run(vec![1], CALLER).await.expect("answered");

        assert!(result.audio_reference.is_none());
        assert!(!result.reply_text.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("synthesis_failure:"));
        assert!(!result.stages.contains(&QueryStage::Synthesized));
        assert_eq!(result.stages.last(), Some(&QueryStage::Done));
    }

    #[tokio::test]
    async fn disabled_synthesis_skips_the_engine() {
        let mut h = hearing("hola");
        h.pipeline.options.synthesis_enabled = false;
        let result = h.pipeline.run(vec![1], CALLER).await.expect("answered");

        assert!(result.audio_reference.is_none());
        assert!(result.warnings.is_empty());
        assert_eq!(h.synthesizer.calls(), 0);
    }

    #[tokio::test]
    async fn text_queries_skip_recognition() {
        let h = hearing("unused");
        let result = h
            .pipeline
            .run_text("¿Cómo está el tráfico en Ruzafa?", None)
            .await
            .expect("answered");

        assert_eq!(result.intent, Intent::TrafficStatus);
        assert_eq!(
            result.entities.text(EntityKind::Zone),
            Some("Ruzafa")
        );
        assert!(result.reply_text.contains("moderado"));
        assert_eq!(h.recognizer.calls(), 0);

        let empty = h.pipeline.run_text("   ", None).await.expect("answered");
        assert_eq!(empty.reply_text, clarification_reply());
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_cache() {
        let h = hearing("unused");
        let entities = EntitySet::new().with(EntityKind::Zone, EntityValue::Text("Ruzafa".into()));

        let first = h.pipeline.lookup(Intent::TrafficStatus, &entities, None).await;
        let second = h.pipeline.lookup(Intent::TrafficStatus, &entities, None).await;

        assert_eq!(first, second);
        assert_eq!(h.providers.calls(), 1);
        assert_eq!(h.pipeline.metrics().snapshot().cache_hits_total, 1);
    }

    #[test]
    fn degraded_outcomes_warn_once() {
        let outcome = DispatchOutcome::Degraded {
            partial: DispatchPayload::Conversational(Intent::Greeting),
            cause: aura_core::ExternalCause::unreachable(aura_core::DataSource::Traffic, "down"),
        };
        assert_eq!(
            warnings_for(&outcome),
            vec![QueryWarning::PartialAnswer(aura_core::DataSource::Traffic)]
        );
    }
}
