pub mod config;
pub mod http;
pub mod offline;
pub mod speech;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use aura_core::{
    AccessibilityPayload, BoundingRegion, GeocodePayload, Location, RoutePayload, StopsPayload,
    TrafficPayload, TransportMode,
};
use aura_gazetteer::Gazetteer;
use thiserror::Error;

pub use config::{HttpEndpoints, ProviderMode, SpeechEndpoints};
pub use offline::OfflineMobilityData;
pub use speech::{
    HttpSpeechRecognizer, HttpSpeechSynthesizer, SpeechError, SpeechFuture, SpeechRecognizer,
    SpeechSynthesizer, SynthesizedAudio, UnavailableSpeech,
};

pub type LookupFuture<T> = Pin<Box<dyn Future<Output = Result<T, LookupError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("no results: {0}")]
    NotFound(String),
    #[error("source unreachable: {0}")]
    Unreachable(String),
    #[error("source timed out after {0:?}")]
    Timeout(Duration),
}

impl LookupError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Unreachable(error.to_string())
        }
    }
}

pub trait StopLocator: Send + Sync {
    /// Up to three stops within `radius_m` of `at`, nearest first.
    fn nearest_stops(&self, at: Location, radius_m: u32) -> LookupFuture<StopsPayload>;
}

pub trait Router: Send + Sync {
    fn route(
        &self,
        origin: Location,
        destination: Location,
        mode: TransportMode,
    ) -> LookupFuture<RoutePayload>;
}

pub trait TrafficSource: Send + Sync {
    fn traffic_status(&self, zone: String) -> LookupFuture<TrafficPayload>;
}

pub trait AccessibilitySource: Send + Sync {
    /// Answers with `found = false` when the place has no accessibility record.
    fn accessibility(&self, place: String) -> LookupFuture<AccessibilityPayload>;
}

pub trait Geocoder: Send + Sync {
    fn geocode(&self, query: String, region: BoundingRegion) -> LookupFuture<GeocodePayload>;
}

/// The five mobility data collaborators the dispatcher consults.
#[derive(Clone)]
pub struct MobilityProviders {
    pub stops: Arc<dyn StopLocator>,
    pub router: Arc<dyn Router>,
    pub traffic: Arc<dyn TrafficSource>,
    pub accessibility: Arc<dyn AccessibilitySource>,
    pub geocoder: Arc<dyn Geocoder>,
}

impl MobilityProviders {
    pub fn offline(gazetteer: Arc<Gazetteer>) -> Self {
        let data = Arc::new(OfflineMobilityData::new(gazetteer));
        Self {
            stops: data.clone(),
            router: data.clone(),
            traffic: data.clone(),
            accessibility: data.clone(),
            geocoder: data,
        }
    }

    pub fn http(endpoints: &HttpEndpoints) -> Result<Self, reqwest::Error> {
        let opendata = Arc::new(http::OpenDataClient::new(endpoints)?);
        Ok(Self {
            stops: opendata.clone(),
            router: Arc::new(http::OsrmRouter::new(endpoints)?),
            traffic: opendata.clone(),
            accessibility: opendata,
            geocoder: Arc::new(http::NominatimGeocoder::new(endpoints)?),
        })
    }
}
