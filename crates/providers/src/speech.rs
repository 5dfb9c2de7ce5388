use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use aura_core::RecognizedUtterance;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type SpeechFuture<T> = Pin<Box<dyn Future<Output = Result<T, SpeechError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("speech engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("speech engine returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl SpeechError {
    fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::EngineUnavailable(error.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    /// File extension without the dot, e.g. `mp3`.
    pub extension: String,
}

pub trait SpeechRecognizer: Send + Sync {
    fn transcribe(&self, audio: Vec<u8>, language: String) -> SpeechFuture<RecognizedUtterance>;
}

pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: String, language: String) -> SpeechFuture<SynthesizedAudio>;
}

/// Stand-in used when no engine URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableSpeech;

impl SpeechRecognizer for UnavailableSpeech {
    fn transcribe(&self, _audio: Vec<u8>, _language: String) -> SpeechFuture<RecognizedUtterance> {
        Box::pin(async {
            Err(SpeechError::EngineUnavailable(
                "no speech recognition engine configured".to_string(),
            ))
        })
    }
}

impl SpeechSynthesizer for UnavailableSpeech {
    fn synthesize(&self, _text: String, _language: String) -> SpeechFuture<SynthesizedAudio> {
        Box::pin(async {
            Err(SpeechError::EngineUnavailable(
                "no speech synthesis engine configured".to_string(),
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Posts raw audio to a transcription endpoint answering `{ text, language?, confidence? }`.
#[derive(Debug, Clone)]
pub struct HttpSpeechRecognizer {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpSpeechRecognizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
            timeout,
        })
    }
}

impl SpeechRecognizer for HttpSpeechRecognizer {
    fn transcribe(&self, audio: Vec<u8>, language: String) -> SpeechFuture<RecognizedUtterance> {
        let client = self.client.clone();
        let url = self.url.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let response = client
                .post(&url)
                .query(&[("language", language.as_str())])
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(audio)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|error| SpeechError::from_reqwest(error, timeout))?;

            let body = response
                .json::<TranscriptionResponse>()
                .await
                .map_err(|error| SpeechError::from_reqwest(error, timeout))?;

            let confidence = body
                .confidence
                .unwrap_or(if body.text.trim().is_empty() { 0.0 } else { 1.0 });
            Ok(RecognizedUtterance::new(
                body.text.trim(),
                body.language.unwrap_or(language),
                confidence,
            ))
        })
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    language: &'a str,
}

/// Posts `{ text, language }` and stores whatever audio bytes come back.
#[derive(Debug, Clone)]
pub struct HttpSpeechSynthesizer {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpSpeechSynthesizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
            timeout,
        })
    }
}

impl SpeechSynthesizer for HttpSpeechSynthesizer {
    fn synthesize(&self, text: String, language: String) -> SpeechFuture<SynthesizedAudio> {
        let client = self.client.clone();
        let url = self.url.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let response = client
                .post(&url)
                .json(&SynthesisRequest {
                    text: &text,
                    language: &language,
                })
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|error| SpeechError::from_reqwest(error, timeout))?;

            let extension = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(extension_for_content_type)
                .unwrap_or("mp3")
                .to_string();

            let bytes = response
                .bytes()
                .await
                .map_err(|error| SpeechError::from_reqwest(error, timeout))?;
            if bytes.is_empty() {
                return Err(SpeechError::InvalidResponse("empty audio body".to_string()));
            }

            Ok(SynthesizedAudio {
                bytes: bytes.to_vec(),
                extension,
            })
        })
    }
}

fn extension_for_content_type(content_type: &str) -> &'static str {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    match mime {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" | "audio/opus" => "ogg",
        _ => "mp3",
    }
}
