//! Scripted collaborators shared by the dispatcher and orchestrator tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aura_core::{
    AccessLevel, AccessibilityPayload, BoundingRegion, GeocodePayload, Location,
    RecognizedUtterance, RoutePayload, StopInfo, StopsPayload, TrafficLevel, TrafficPayload,
    TransportMode,
};
use aura_providers::{
    AccessibilitySource, Geocoder, LookupError, LookupFuture, MobilityProviders, Router,
    SpeechError, SpeechFuture, SpeechRecognizer, SpeechSynthesizer, StopLocator,
    SynthesizedAudio, TrafficSource,
};
use parking_lot::Mutex;

const HANG: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Script {
    #[default]
    Answer,
    NotFound,
    Unreachable,
    /// Never answers within any test timeout.
    Hang,
}

impl Script {
    fn play<T: Send + 'static>(self, answer: T) -> LookupFuture<T> {
        Box::pin(async move {
            match self {
                Script::Answer => Ok(answer),
                Script::NotFound => Err(LookupError::NotFound("scripted".into())),
                Script::Unreachable => Err(LookupError::Unreachable("connection refused".into())),
                Script::Hang => {
                    tokio::time::sleep(HANG).await;
                    Err(LookupError::Timeout(HANG))
                }
            }
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct CallLog {
    calls: usize,
    stop_queries: Vec<(Location, u32)>,
    geocoded: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeProviders {
    pub stops: Script,
    pub router: Script,
    pub traffic: Script,
    pub accessibility: Script,
    pub geocoder: Script,
    pub(crate) log: Arc<Mutex<CallLog>>,
}

impl FakeProviders {
    pub fn providers(&self) -> MobilityProviders {
        let shared = Arc::new(self.clone());
        MobilityProviders {
            stops: shared.clone(),
            router: shared.clone(),
            traffic: shared.clone(),
            accessibility: shared.clone(),
            geocoder: shared,
        }
    }

    pub fn calls(&self) -> usize {
        self.log.lock().calls
    }

    pub fn last_stop_query(&self) -> Option<(Location, u32)> {
        self.log.lock().stop_queries.last().copied()
    }

    pub fn geocoded(&self) -> Vec<String> {
        self.log.lock().geocoded.clone()
    }
}

impl StopLocator for FakeProviders {
    fn nearest_stops(&self, at: Location, radius_m: u32) -> LookupFuture<StopsPayload> {
        {
            let mut log = self.log.lock();
            log.calls += 1;
            log.stop_queries.push((at, radius_m));
        }
        self.stops.play(StopsPayload {
            radius_m,
            stops: vec![StopInfo {
                name: "Plaza del Ayuntamiento".into(),
                distance_m: 78.0,
                lines: vec!["4".into(), "6".into(), "8".into()],
                location: Location::new(39.4697, -0.3772),
            }],
        })
    }
}

impl Router for FakeProviders {
    fn route(
        &self,
        origin: Location,
        destination: Location,
        mode: TransportMode,
    ) -> LookupFuture<RoutePayload> {
        self.log.lock().calls += 1;
        self.router.play(RoutePayload {
            origin,
            destination,
            destination_name: None,
            mode,
            distance_m: 1460.0,
            duration_s: 1080.0,
            instructions: vec!["Sal por Carrer de Sant Vicent Màrtir durante 200 metros".into()],
            traffic: None,
        })
    }
}

impl TrafficSource for FakeProviders {
    fn traffic_status(&self, zone: String) -> LookupFuture<TrafficPayload> {
        self.log.lock().calls += 1;
        self.traffic.play(TrafficPayload {
            zone,
            level: TrafficLevel::Moderate,
            average_speed_kmh: Some(25.5),
        })
    }
}

impl AccessibilitySource for FakeProviders {
    fn accessibility(&self, place: String) -> LookupFuture<AccessibilityPayload> {
        self.log.lock().calls += 1;
        // An unknown venue is an answer with `found = false`, not an error.
        let script = match self.accessibility {
            Script::NotFound => Script::Answer,
            other => other,
        };
        let found = self.accessibility != Script::NotFound;
        script.play(AccessibilityPayload {
            place,
            found,
            access: if found { AccessLevel::Full } else { AccessLevel::Unknown },
            details: found.then(|| "Rampa en la entrada principal".to_string()),
            address: None,
            phone: None,
        })
    }
}

impl Geocoder for FakeProviders {
    fn geocode(&self, query: String, _region: BoundingRegion) -> LookupFuture<GeocodePayload> {
        {
            let mut log = self.log.lock();
            log.calls += 1;
            log.geocoded.push(query.clone());
        }
        self.geocoder.play(GeocodePayload {
            display_name: format!("{query}, València"),
            query,
            location: Location::new(39.4702, -0.3712),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechScript {
    Answer,
    Unavailable,
    Hang,
}

/// Recognizer that "hears" a fixed utterance.
#[derive(Clone)]
pub struct FakeRecognizer {
    pub heard: RecognizedUtterance,
    pub script: SpeechScript,
    calls: Arc<AtomicUsize>,
}

impl FakeRecognizer {
    pub fn hearing(text: &str, confidence: f32) -> Self {
        Self {
            heard: RecognizedUtterance::new(text, "es", confidence),
            script: SpeechScript::Answer,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(script: SpeechScript) -> Self {
        Self {
            script,
            ..Self::hearing("", 0.0)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechRecognizer for FakeRecognizer {
    fn transcribe(&self, _audio: Vec<u8>, _language: String) -> SpeechFuture<RecognizedUtterance> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let heard = self.heard.clone();
        let script = self.script;
        Box::pin(async move {
            match script {
                SpeechScript::Answer => Ok(heard),
                SpeechScript::Unavailable => {
                    Err(SpeechError::EngineUnavailable("connection refused".into()))
                }
                SpeechScript::Hang => {
                    tokio::time::sleep(HANG).await;
                    Err(SpeechError::Timeout(HANG))
                }
            }
        })
    }
}

#[derive(Clone)]
pub struct FakeSynthesizer {
    pub script: SpeechScript,
    calls: Arc<AtomicUsize>,
}

impl FakeSynthesizer {
    pub fn new(script: SpeechScript) -> Self {
        Self {
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechSynthesizer for FakeSynthesizer {
    fn synthesize(&self, text: String, _language: String) -> SpeechFuture<SynthesizedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script;
        Box::pin(async move {
            match script {
                SpeechScript::Answer => Ok(SynthesizedAudio {
                    bytes: text.into_bytes(),
                    extension: "mp3".into(),
                }),
                SpeechScript::Unavailable => {
                    Err(SpeechError::EngineUnavailable("connection refused".into()))
                }
                SpeechScript::Hang => {
                    tokio::time::sleep(HANG).await;
                    Err(SpeechError::Timeout(HANG))
                }
            }
        })
    }
}
