use std::time::Duration;

use aura_core::{
    format_distance, AccessLevel, AccessibilityPayload, BoundingRegion, GeocodePayload, Location,
    RoutePayload, StopInfo, StopsPayload, TrafficLevel, TrafficPayload, TransportMode,
};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::HttpEndpoints;
use crate::{
    AccessibilitySource, Geocoder, LookupError, LookupFuture, Router, StopLocator, TrafficSource,
};

const STOPS_DATASET: &str = "emt";
const TRAFFIC_DATASET: &str = "sensores-trafico";
const ACCESSIBILITY_DATASET: &str = "recursos-turisticos";
const MAX_STOPS: usize = 3;

fn build_client(endpoints: &HttpEndpoints) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(endpoints.request_timeout)
        .user_agent(endpoints.user_agent.clone())
        .build()
}

async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, LookupError> {
    let response = request
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|error| LookupError::from_reqwest(error, timeout))?;
    response
        .json::<T>()
        .await
        .map_err(|error| LookupError::Unreachable(format!("malformed response: {error}")))
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    records: Vec<SearchRecord>,
}

#[derive(Debug, Deserialize)]
struct SearchRecord {
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// GeoJSON order: longitude, latitude.
    coordinates: (f64, f64),
}

/// Valencia open-data search API (stops, traffic sensors, tourist resources).
#[derive(Debug, Clone)]
pub struct OpenDataClient {
    client: Client,
    search_url: String,
    timeout: Duration,
}

impl OpenDataClient {
    pub fn new(endpoints: &HttpEndpoints) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(endpoints)?,
            search_url: endpoints.opendata_url.clone(),
            timeout: endpoints.request_timeout,
        })
    }

    fn search(&self, params: Vec<(&'static str, String)>) -> LookupFuture<SearchResponse> {
        let request = self.client.get(&self.search_url).query(&params);
        let timeout = self.timeout;
        Box::pin(async move { get_json::<SearchResponse>(request, timeout).await })
    }
}

impl StopLocator for OpenDataClient {
    fn nearest_stops(&self, at: Location, radius_m: u32) -> LookupFuture<StopsPayload> {
        let search = self.search(vec![
            ("dataset", STOPS_DATASET.to_string()),
            ("geofilter.distance", format!("{},{},{}", at.lat, at.lon, radius_m)),
            ("rows", MAX_STOPS.to_string()),
        ]);

        Box::pin(async move {
            let response = search.await?;
            let stops = parse_stops(&response.records, at);
            debug!(found = stops.len(), radius_m, "open data stop search");
            if stops.is_empty() {
                return Err(LookupError::NotFound(format!("no stops within {radius_m} m")));
            }
            Ok(StopsPayload { radius_m, stops })
        })
    }
}

impl TrafficSource for OpenDataClient {
    fn traffic_status(&self, zone: String) -> LookupFuture<TrafficPayload> {
        let search = self.search(vec![
            ("dataset", TRAFFIC_DATASET.to_string()),
            ("q", zone.clone()),
            ("rows", "20".to_string()),
        ]);

        Box::pin(async move {
            let response = search.await?;
            if response.records.is_empty() {
                return Err(LookupError::NotFound(format!("no traffic sensors for {zone}")));
            }
            Ok(summarize_traffic(zone, &response.records))
        })
    }
}

impl AccessibilitySource for OpenDataClient {
    fn accessibility(&self, place: String) -> LookupFuture<AccessibilityPayload> {
        let search = self.search(vec![
            ("dataset", ACCESSIBILITY_DATASET.to_string()),
            ("q", place.clone()),
            ("rows", "5".to_string()),
        ]);

        Box::pin(async move {
            let response = search.await?;
            Ok(match response.records.first() {
                Some(record) => accessibility_from_fields(place, &record.fields),
                None => AccessibilityPayload {
                    place,
                    found: false,
                    access: AccessLevel::Unknown,
                    details: None,
                    address: None,
                    phone: None,
                },
            })
        })
    }
}

fn field_str(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

fn field_f64(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::Number(value) => value.as_f64(),
        Value::String(value) => value.trim().replace(',', ".").parse().ok(),
        _ => None,
    })
}

fn parse_lines(fields: &Map<String, Value>) -> Vec<String> {
    match fields.get("lineas") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(line) => Some(line.trim().to_string()),
                Value::Number(line) => Some(line.to_string()),
                _ => None,
            })
            .filter(|line| !line.is_empty())
            .collect(),
        Some(Value::String(joined)) => joined
            .split([',', ';', '-'])
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty() && line != "N/D")
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_stops(records: &[SearchRecord], at: Location) -> Vec<StopInfo> {
    let mut stops = records
        .iter()
        .map(|record| {
            let location = record
                .geometry
                .as_ref()
                .map(|geometry| Location::new(geometry.coordinates.1, geometry.coordinates.0))
                .unwrap_or(at);
            let distance_m = field_f64(&record.fields, &["dist"])
                .unwrap_or_else(|| at.distance_m(&location));

            StopInfo {
                name: field_str(&record.fields, &["nombre", "nom_parada", "denominacion"])
                    .unwrap_or_else(|| "Parada sin nombre".to_string()),
                distance_m,
                lines: parse_lines(&record.fields),
                location,
            }
        })
        .collect::<Vec<_>>();

    stops.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    stops.truncate(MAX_STOPS);
    stops
}

fn summarize_traffic(zone: String, records: &[SearchRecord]) -> TrafficPayload {
    let speeds = records
        .iter()
        .filter_map(|record| field_f64(&record.fields, &["velocidad_media", "velocidad"]))
        .filter(|speed| speed.is_finite() && *speed >= 0.0)
        .collect::<Vec<_>>();

    if speeds.is_empty() {
        return TrafficPayload {
            zone,
            level: TrafficLevel::Unknown,
            average_speed_kmh: None,
        };
    }

    let average = speeds.iter().sum::<f64>() / speeds.len() as f64;
    TrafficPayload {
        zone,
        level: TrafficLevel::from_average_speed(average),
        average_speed_kmh: Some((average * 10.0).round() / 10.0),
    }
}

fn parse_access_level(raw: Option<&str>) -> AccessLevel {
    let Some(raw) = raw else {
        return AccessLevel::Unknown;
    };
    let value = aura_core::normalize_text(raw);
    if value.contains("parcial") {
        AccessLevel::Partial
    } else if value == "no" || value.starts_with("no ") || value.contains("no accesible") {
        AccessLevel::None
    } else if ["si", "total", "accesible", "adaptado", "completa"]
        .iter()
        .any(|word| value == *word || value.starts_with(&format!("{word} ")))
    {
        AccessLevel::Full
    } else {
        AccessLevel::Unknown
    }
}

fn accessibility_from_fields(place: String, fields: &Map<String, Value>) -> AccessibilityPayload {
    AccessibilityPayload {
        place,
        found: true,
        access: parse_access_level(field_str(fields, &["accesibilidad"]).as_deref()),
        details: field_str(fields, &["detalles_acceso"]),
        address: field_str(fields, &["direccion"]).filter(|value| value != "N/D"),
        phone: field_str(fields, &["telefono"]).filter(|value| value != "N/D"),
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OsrmRouter {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OsrmRouter {
    pub fn new(endpoints: &HttpEndpoints) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(endpoints)?,
            base_url: endpoints.osrm_url.trim_end_matches('/').to_string(),
            timeout: endpoints.request_timeout,
        })
    }
}

impl Router for OsrmRouter {
    fn route(
        &self,
        origin: Location,
        destination: Location,
        mode: TransportMode,
    ) -> LookupFuture<RoutePayload> {
        let url = format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url,
            mode.routing_profile(),
            origin.lon,
            origin.lat,
            destination.lon,
            destination.lat
        );
        let request = self
            .client
            .get(url)
            .query(&[("overview", "false"), ("steps", "true")]);
        let timeout = self.timeout;

        Box::pin(async move {
            let response = get_json::<OsrmResponse>(request, timeout).await?;
            route_from_osrm(response, origin, destination, mode)
        })
    }
}

fn route_from_osrm(
    response: OsrmResponse,
    origin: Location,
    destination: Location,
    mode: TransportMode,
) -> Result<RoutePayload, LookupError> {
    if response.code != "Ok" {
        return Err(LookupError::NotFound(format!("router answered {}", response.code)));
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| LookupError::NotFound("router returned no routes".to_string()))?;

    let instructions = route
        .legs
        .iter()
        .flat_map(|leg| leg.steps.iter())
        .map(describe_step)
        .collect();

    Ok(RoutePayload {
        origin,
        destination,
        destination_name: None,
        mode,
        distance_m: route.distance,
        duration_s: route.duration,
        instructions,
        traffic: None,
    })
}

fn describe_step(step: &OsrmStep) -> String {
    let street = if step.name.trim().is_empty() {
        String::new()
    } else {
        format!(" por {}", step.name.trim())
    };
    let turn = step
        .maneuver
        .modifier
        .as_deref()
        .map(modifier_phrase)
        .unwrap_or("");

    let action = match step.maneuver.kind.as_str() {
        "depart" => format!("Sal{street}"),
        "arrive" => return "Llegarás a tu destino".to_string(),
        "roundabout" | "rotary" => format!("En la rotonda, toma la salida{street}"),
        "turn" | "end of road" | "fork" | "on ramp" | "off ramp" if !turn.is_empty() => {
            format!("Gira {turn}{street}")
        }
        _ => format!("Continúa{street}"),
    };

    if step.distance > 0.0 {
        format!("{action} durante {}", format_distance(step.distance))
    } else {
        action
    }
}

fn modifier_phrase(modifier: &str) -> &'static str {
    match modifier {
        "left" => "a la izquierda",
        "right" => "a la derecha",
        "slight left" => "ligeramente a la izquierda",
        "slight right" => "ligeramente a la derecha",
        "sharp left" => "bruscamente a la izquierda",
        "sharp right" => "bruscamente a la derecha",
        "uturn" => "en sentido contrario",
        "straight" => "recto",
        _ => "",
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    url: String,
    user_agent: String,
    timeout: Duration,
}

impl NominatimGeocoder {
    pub fn new(endpoints: &HttpEndpoints) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(endpoints)?,
            url: endpoints.nominatim_url.clone(),
            user_agent: endpoints.user_agent.clone(),
            timeout: endpoints.request_timeout,
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, query: String, region: BoundingRegion) -> LookupFuture<GeocodePayload> {
        let viewbox = format!(
            "{},{},{},{}",
            region.min_lon, region.max_lat, region.max_lon, region.min_lat
        );
        let request = self
            .client
            .get(&self.url)
            .header(USER_AGENT, self.user_agent.clone())
            .query(&[
                ("q", query.as_str()),
                ("format", "json"),
                ("limit", "1"),
                ("bounded", "1"),
                ("viewbox", viewbox.as_str()),
            ]);
        let timeout = self.timeout;

        Box::pin(async move {
            let places = get_json::<Vec<NominatimPlace>>(request, timeout).await?;
            geocode_from_nominatim(query, places, region)
        })
    }
}

fn geocode_from_nominatim(
    query: String,
    places: Vec<NominatimPlace>,
    region: BoundingRegion,
) -> Result<GeocodePayload, LookupError> {
    let place = places
        .into_iter()
        .next()
        .ok_or_else(|| LookupError::NotFound(format!("no address matches {query}")))?;

    let (Ok(lat), Ok(lon)) = (place.lat.parse::<f64>(), place.lon.parse::<f64>()) else {
        return Err(LookupError::Unreachable(format!(
            "geocoder returned unparsable coordinates for {query}"
        )));
    };
    let location = Location::new(lat, lon);
    if !region.contains(&location) {
        return Err(LookupError::NotFound(format!("{query} is outside the service area")));
    }

    Ok(GeocodePayload {
        query,
        display_name: place.display_name,
        location,
    })
}
