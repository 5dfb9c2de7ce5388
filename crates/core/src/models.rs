use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

pub const DEFAULT_STOP_RADIUS_M: u32 = 300;
pub const MIN_STOP_RADIUS_M: u32 = 50;
pub const MAX_STOP_RADIUS_M: u32 = 2000;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    NearestStop,
    Route,
    TrafficStatus,
    AccessibilityInfo,
    Geocode,
    Greeting,
    Farewell,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::NearestStop,
        Intent::Route,
        Intent::TrafficStatus,
        Intent::AccessibilityInfo,
        Intent::Geocode,
        Intent::Greeting,
        Intent::Farewell,
        Intent::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NearestStop => "nearest_stop",
            Self::Route => "route",
            Self::TrafficStatus => "traffic_status",
            Self::AccessibilityInfo => "accessibility_info",
            Self::Geocode => "geocode",
            Self::Greeting => "greeting",
            Self::Farewell => "farewell",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == value)
    }

    /// Entity kinds the extractor may produce for this intent.
    pub fn entity_kinds(self) -> &'static [EntityKind] {
        match self {
            Self::NearestStop => &[EntityKind::Place, EntityKind::OriginCoords, EntityKind::Radius],
            Self::Route => &[
                EntityKind::Place,
                EntityKind::OriginCoords,
                EntityKind::DestinationCoords,
                EntityKind::Mode,
                EntityKind::Zone,
            ],
            Self::TrafficStatus => &[EntityKind::Zone],
            Self::AccessibilityInfo => &[EntityKind::Place],
            Self::Geocode => &[EntityKind::Place],
            Self::Greeting | Self::Farewell | Self::Unknown => &[],
        }
    }

    pub fn is_conversational(self) -> bool {
        matches!(self, Self::Greeting | Self::Farewell)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedUtterance {
    pub text: String,
    pub language: String,
    pub confidence: f32,
}

impl RecognizedUtterance {
    pub fn new(text: impl Into<String>, language: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            confidence: clamp_unit(confidence),
        }
    }

    pub fn is_unrecognized(&self) -> bool {
        self.text.trim().is_empty() || self.confidence <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    pub confidence: f32,
    pub matched_pattern_id: Option<String>,
}

impl ClassificationResult {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            matched_pattern_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Place,
    Zone,
    OriginCoords,
    DestinationCoords,
    Mode,
    Radius,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Zone => "zone",
            Self::OriginCoords => "origin_coords",
            Self::DestinationCoords => "destination_coords",
            Self::Mode => "mode",
            Self::Radius => "radius",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Foot,
    Bike,
    Car,
    Bus,
}

impl TransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foot => "foot",
            Self::Bike => "bike",
            Self::Car => "car",
            Self::Bus => "bus",
        }
    }

    /// Profile name understood by OSRM-style routers. Buses share the road network with cars.
    pub fn routing_profile(self) -> &'static str {
        match self {
            Self::Foot => "foot",
            Self::Bike => "cycling",
            Self::Car | Self::Bus => "driving",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "foot" | "walk" | "walking" | "pie" => Some(Self::Foot),
            "bike" | "bicycle" | "cycling" | "bici" => Some(Self::Bike),
            "car" | "driving" | "coche" => Some(Self::Car),
            "bus" | "autobus" | "transit" => Some(Self::Bus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in metres.
    pub fn distance_m(&self, other: &Location) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    pub fn bearing_deg(&self, other: &Location) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRegion {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingRegion {
    /// Valencia metropolitan service area.
    pub fn valencia() -> Self {
        Self {
            min_lat: 39.30,
            min_lon: -0.50,
            max_lat: 39.60,
            max_lon: 0.00,
        }
    }

    pub fn contains(&self, location: &Location) -> bool {
        (self.min_lat..=self.max_lat).contains(&location.lat)
            && (self.min_lon..=self.max_lon).contains(&location.lon)
    }

    pub fn validate(&self, lat: f64, lon: f64) -> Result<Location, QueryError> {
        let location = Location::new(lat, lon);
        if lat.is_finite() && lon.is_finite() && self.contains(&location) {
            Ok(location)
        } else {
            Err(QueryError::InvalidLocation { lat, lon })
        }
    }

    /// Parses `min_lat,min_lon,max_lat,max_lon`.
    pub fn parse(value: &str) -> Option<Self> {
        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [min_lat, min_lon, max_lat, max_lon] if min_lat < max_lat && min_lon < max_lon => {
                Some(Self {
                    min_lat: *min_lat,
                    min_lon: *min_lon,
                    max_lat: *max_lat,
                    max_lon: *max_lon,
                })
            }
            _ => None,
        }
    }
}

impl Default for BoundingRegion {
    fn default() -> Self {
        Self::valencia()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EntityValue {
    Text(String),
    Coords(Location),
    Mode(TransportMode),
    Radius(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySet {
    values: BTreeMap<EntityKind, EntityValue>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, value: EntityValue) {
        self.values.insert(kind, value);
    }

    pub fn with(mut self, kind: EntityKind, value: EntityValue) -> Self {
        self.insert(kind, value);
        self
    }

    pub fn get(&self, kind: EntityKind) -> Option<&EntityValue> {
        self.values.get(&kind)
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.values.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn text(&self, kind: EntityKind) -> Option<&str> {
        match self.values.get(&kind) {
            Some(EntityValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn coords(&self, kind: EntityKind) -> Option<Location> {
        match self.values.get(&kind) {
            Some(EntityValue::Coords(location)) => Some(*location),
            _ => None,
        }
    }

    pub fn mode(&self) -> Option<TransportMode> {
        match self.values.get(&EntityKind::Mode) {
            Some(EntityValue::Mode(mode)) => Some(*mode),
            _ => None,
        }
    }

    pub fn radius(&self) -> Option<u32> {
        match self.values.get(&EntityKind::Radius) {
            Some(EntityValue::Radius(radius)) => Some(*radius),
            _ => None,
        }
    }

    /// Drops every entity the intent does not declare.
    pub fn retain_declared(&mut self, intent: Intent) {
        let declared = intent.entity_kinds();
        self.values.retain(|kind, _| declared.contains(kind));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopInfo {
    pub name: String,
    pub distance_m: f64,
    pub lines: Vec<String>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopsPayload {
    pub radius_m: u32,
    pub stops: Vec<StopInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePayload {
    pub origin: Location,
    pub destination: Location,
    pub destination_name: Option<String>,
    pub mode: TransportMode,
    pub distance_m: f64,
    pub duration_s: f64,
    pub instructions: Vec<String>,
    pub traffic: Option<TrafficPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLevel {
    Fluid,
    Moderate,
    Dense,
    Unknown,
}

impl TrafficLevel {
    pub fn from_average_speed(speed_kmh: f64) -> Self {
        if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
            Self::Unknown
        } else if speed_kmh > 35.0 {
            Self::Fluid
        } else if speed_kmh > 20.0 {
            Self::Moderate
        } else {
            Self::Dense
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPayload {
    pub zone: String,
    pub level: TrafficLevel,
    pub average_speed_kmh: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Full,
    Partial,
    None,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityPayload {
    pub place: String,
    pub found: bool,
    pub access: AccessLevel,
    pub details: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodePayload {
    pub query: String,
    pub display_name: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DispatchPayload {
    Stops(StopsPayload),
    Route(RoutePayload),
    Traffic(TrafficPayload),
    Accessibility(AccessibilityPayload),
    Geocode(GeocodePayload),
    Conversational(Intent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    StopLocator,
    Router,
    Traffic,
    Accessibility,
    Geocoder,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StopLocator => "stop_locator",
            Self::Router => "routing",
            Self::Traffic => "traffic",
            Self::Accessibility => "accessibility",
            Self::Geocoder => "geocoding",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCause {
    pub source: DataSource,
    pub kind: FailureKind,
    pub detail: String,
}

impl ExternalCause {
    pub fn unreachable(source: DataSource, detail: impl Into<String>) -> Self {
        Self {
            source,
            kind: FailureKind::Unreachable,
            detail: detail.into(),
        }
    }

    pub fn timeout(source: DataSource, detail: impl Into<String>) -> Self {
        Self {
            source,
            kind: FailureKind::Timeout,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "value", rename_all = "snake_case")]
pub enum NotFoundReason {
    MissingParameter(EntityKind),
    NoResults(DataSource),
    UnknownPlace(String),
    Unsupported,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParameter(kind) => write!(f, "missing_parameter:{kind}"),
            Self::NoResults(source) => write!(f, "no_results:{source}"),
            Self::UnknownPlace(place) => write!(f, "unknown_place:{place}"),
            Self::Unsupported => f.write_str("unsupported_intent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Success { payload: DispatchPayload },
    NotFound { reason: NotFoundReason },
    ExternalFailure { cause: ExternalCause },
    Degraded { partial: DispatchPayload, cause: ExternalCause },
}

impl DispatchOutcome {
    pub fn success(payload: DispatchPayload) -> Self {
        Self::Success { payload }
    }

    pub fn not_found(reason: NotFoundReason) -> Self {
        Self::NotFound { reason }
    }

    pub fn missing(kind: EntityKind) -> Self {
        Self::NotFound {
            reason: NotFoundReason::MissingParameter(kind),
        }
    }

    pub fn external(cause: ExternalCause) -> Self {
        Self::ExternalFailure { cause }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::NotFound { .. } => "not_found",
            Self::ExternalFailure { .. } => "external_failure",
            Self::Degraded { .. } => "degraded",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Received,
    Transcribed,
    Classified,
    LowConfidence,
    Clarifying,
    Extracted,
    Dispatched,
    Composed,
    Synthesized,
    Done,
    Failed,
}

impl QueryStage {
    pub fn can_advance_to(self, next: QueryStage) -> bool {
        use QueryStage::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Received, Transcribed)
                | (Transcribed, Classified)
                | (Classified, LowConfidence)
                | (Classified, Extracted)
                | (LowConfidence, Clarifying)
                | (Clarifying, Synthesized)
                | (Clarifying, Done)
                | (Extracted, Dispatched)
                | (Dispatched, Composed)
                | (Composed, Synthesized)
                | (Composed, Done)
                | (Synthesized, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceQueryResult {
    pub query_id: String,
    pub recognized_text: String,
    pub language: String,
    pub intent: Intent,
    pub confidence: f32,
    pub matched_pattern_id: Option<String>,
    pub entities: EntitySet,
    pub outcome: Option<DispatchOutcome>,
    pub reply_text: String,
    pub audio_reference: Option<String>,
    pub elapsed_ms: u64,
    pub warnings: Vec<String>,
    pub stages: Vec<QueryStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceQueryRecord {
    pub result: VoiceQueryResult,
    pub caller_location: Option<Location>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
