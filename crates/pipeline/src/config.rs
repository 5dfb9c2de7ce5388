use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use aura_core::BoundingRegion;
use aura_providers::{HttpEndpoints, ProviderMode, SpeechEndpoints};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(8_000);
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 16;
pub const DEFAULT_AUDIO_DIR: &str = "media/audio";

/// Knobs the orchestrator reads on every query.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub confidence_threshold: f32,
    pub call_timeout: Duration,
    pub synthesis_enabled: bool,
    pub language: String,
    pub region: BoundingRegion,
    pub max_concurrent_queries: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            synthesis_enabled: true,
            language: "es".to_string(),
            region: BoundingRegion::valencia(),
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
        }
    }
}

/// Everything needed to assemble a pipeline, read once at startup.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub options: PipelineOptions,
    pub providers: ProviderMode,
    pub http: HttpEndpoints,
    pub speech: SpeechEndpoints,
    pub audio_dir: PathBuf,
    pub database_url: Option<String>,
    pub gazetteer_dir: Option<PathBuf>,
}

impl PipelineSettings {
    /// Reads `AURA_*` variables. Unparsable values fall back to defaults, except
    /// `AURA_BOUNDS`, which must describe a valid box when set.
    pub fn from_env() -> Result<Self> {
        let region = match non_empty_env("AURA_BOUNDS") {
            Some(raw) => match BoundingRegion::parse(&raw) {
                Some(region) => region,
                None => bail!("AURA_BOUNDS must be `min_lat,min_lon,max_lat,max_lon`, got `{raw}`"),
            },
            None => BoundingRegion::valencia(),
        };

        let call_timeout = env::var("AURA_CALL_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CALL_TIMEOUT);

        let options = PipelineOptions {
            confidence_threshold: env::var("AURA_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|value| value.parse::<f32>().ok())
                .filter(|value| (0.0..=1.0).contains(value))
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            call_timeout,
            synthesis_enabled: env::var("AURA_SYNTHESIS_ENABLED")
                .ok()
                .and_then(|value| parse_flag(&value))
                .unwrap_or(true),
            language: non_empty_env("AURA_LANGUAGE").unwrap_or_else(|| "es".to_string()),
            region,
            max_concurrent_queries: env::var("AURA_MAX_CONCURRENT_QUERIES")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_QUERIES),
        };

        Ok(Self {
            options,
            providers: ProviderMode::from_env(),
            http: HttpEndpoints::from_env(call_timeout),
            speech: SpeechEndpoints::from_env(call_timeout),
            audio_dir: non_empty_env("AURA_AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIO_DIR)),
            database_url: non_empty_env("AURA_DATABASE_URL"),
            gazetteer_dir: non_empty_env("AURA_GAZETTEER_DIR").map(PathBuf::from),
        })
    }

    /// Self-contained settings: offline data, memory store, no speech engines.
    pub fn offline(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            options: PipelineOptions::default(),
            providers: ProviderMode::Offline,
            http: HttpEndpoints::default(),
            speech: SpeechEndpoints::default(),
            audio_dir: audio_dir.into(),
            database_url: None,
            gazetteer_dir: None,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
