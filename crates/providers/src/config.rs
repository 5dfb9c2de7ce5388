use std::env;
use std::time::Duration;

pub const DEFAULT_OPENDATA_URL: &str = "https://valencia.opendatasoft.com/api/records/1.0/search/";
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_USER_AGENT: &str = "aura-voice/0.1 (urban mobility assistant)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    Offline,
    Http,
}

impl ProviderMode {
    pub fn from_env() -> Self {
        match env::var("AURA_PROVIDERS")
            .ok()
            .map(|value| value.trim().to_lowercase())
            .as_deref()
        {
            Some("http") => Self::Http,
            _ => Self::Offline,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpEndpoints {
    pub opendata_url: String,
    pub osrm_url: String,
    pub nominatim_url: String,
    pub user_agent: String,
    /// Client-side ceiling; the dispatcher applies its own per-call timeout on top.
    pub request_timeout: Duration,
}

impl HttpEndpoints {
    pub fn from_env(request_timeout: Duration) -> Self {
        Self {
            opendata_url: env_or("AURA_OPENDATA_URL", DEFAULT_OPENDATA_URL),
            osrm_url: env_or("AURA_OSRM_URL", DEFAULT_OSRM_URL),
            nominatim_url: env_or("AURA_NOMINATIM_URL", DEFAULT_NOMINATIM_URL),
            user_agent: env_or("AURA_USER_AGENT", DEFAULT_USER_AGENT),
            request_timeout,
        }
    }
}

impl Default for HttpEndpoints {
    fn default() -> Self {
        Self {
            opendata_url: DEFAULT_OPENDATA_URL.to_string(),
            osrm_url: DEFAULT_OSRM_URL.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpeechEndpoints {
    pub stt_url: Option<String>,
    pub tts_url: Option<String>,
    pub request_timeout: Duration,
}

impl SpeechEndpoints {
    pub fn from_env(request_timeout: Duration) -> Self {
        Self {
            stt_url: non_empty_env("AURA_STT_URL"),
            tts_url: non_empty_env("AURA_TTS_URL"),
            request_timeout,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    non_empty_env(key).unwrap_or_else(|| default.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
