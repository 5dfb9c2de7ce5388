mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use aura_core::{
    EntityKind, EntitySet, EntityValue, Intent, Location, QueryError, TransportMode,
    MAX_STOP_RADIUS_M, MIN_STOP_RADIUS_M,
};
use aura_observability::{AppMetrics, MetricsSnapshot};
use aura_pipeline::{build_pipeline, PipelineSettings, VoicePipeline};
use aura_storage::{AudioStoreError, Store};
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::rate_limit::IpRateLimiter;

const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const MAX_TEXT_QUERY_LEN: usize = 1_000;
const MAX_FREE_TEXT_PARAM_LEN: usize = 200;

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<VoicePipeline<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
}

/// HTTP-boundary settings, separate from the pipeline's own.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub allowed_origins: Vec<String>,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("AURA_API_KEY").unwrap_or_else(|_| "dev-aura-key".to_string()),
            rate_limit_window: Duration::from_secs(
                env::var("AURA_API_RATE_LIMIT_WINDOW_SECONDS")
                    .ok()
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(60),
            ),
            rate_limit_max: env::var("AURA_API_RATE_LIMIT_MAX")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(60),
            allowed_origins: parse_allowed_origins(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
struct HealthCapabilities {
    synthesis: bool,
    store: &'static str,
    language: String,
}

#[derive(Debug, Deserialize)]
struct VoiceQueryRequest {
    audio_base64: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct TextQueryRequest {
    text: String,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NearestStopsQuery {
    lat: f64,
    lon: f64,
    radius: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RouteQuery {
    origin_lat: f64,
    origin_lon: f64,
    destination_lat: f64,
    destination_lon: f64,
    mode: Option<String>,
    destination_name: Option<String>,
    /// Destination traffic zone; enables the live traffic check for car routes.
    zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrafficQuery {
    zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessibilityQuery {
    place: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeQuery {
    address: Option<String>,
}

/// Builds the app from `AURA_*` environment configuration.
pub async fn build_app() -> Result<Router> {
    build_app_with(PipelineSettings::from_env()?, ApiConfig::from_env()).await
}

pub async fn build_app_with(settings: PipelineSettings, config: ApiConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();
    let pipeline = Arc::new(build_pipeline(&settings, metrics.clone()).await?);

    let state = ApiState {
        pipeline,
        metrics,
        api_key: config.api_key,
        limiter: IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        allowed_origins: Arc::new(config.allowed_origins),
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/voice-query", post(voice_query))
        .route("/v1/text-query", post(text_query))
        .route("/v1/stops/nearest", get(nearest_stops))
        .route("/v1/route", get(route))
        .route("/v1/traffic", get(traffic))
        .route("/v1/accessibility", get(accessibility))
        .route("/v1/geocode", get(geocode))
        .route("/v1/audio/:name", get(audio))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let options = state.pipeline.options();
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            synthesis: options.synthesis_enabled,
            store: state.pipeline.store().backend(),
            language: options.language.clone(),
        },
    };
    (StatusCode::OK, Json(payload))
}

async fn voice_query(
    State(state): State<ApiState>,
    Json(request): Json<VoiceQueryRequest>,
) -> Response {
    let audio = match STANDARD.decode(request.audio_base64.trim()) {
        Ok(audio) if !audio.is_empty() => audio,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "invalid_audio", "audio payload is empty"),
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_audio",
                "audio_base64 is not valid base64",
            )
        }
    };

    match state
        .pipeline
        .run(audio, Location::new(request.lat, request.lon))
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => query_error_response(error),
    }
}

async fn text_query(
    State(state): State<ApiState>,
    Json(request): Json<TextQueryRequest>,
) -> Response {
    if request.text.chars().count() > MAX_TEXT_QUERY_LEN {
        return error_response(
            StatusCode::BAD_REQUEST,
            "text_too_long",
            "text must be at most 1000 characters",
        );
    }

    let caller = match (request.lat, request.lon) {
        (Some(lat), Some(lon)) => Some(Location::new(lat, lon)),
        (None, None) => None,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "bad_request",
                "lat and lon must be given together",
            )
        }
    };

    match state.pipeline.run_text(&request.text, caller).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => query_error_response(error),
    }
}

async fn nearest_stops(
    State(state): State<ApiState>,
    Query(query): Query<NearestStopsQuery>,
) -> Response {
    let origin = match validate_location(&state, query.lat, query.lon) {
        Ok(origin) => origin,
        Err(response) => return response,
    };

    let mut entities = EntitySet::new().with(EntityKind::OriginCoords, EntityValue::Coords(origin));
    if let Some(radius) = query.radius {
        entities.insert(
            EntityKind::Radius,
            EntityValue::Radius(radius.clamp(MIN_STOP_RADIUS_M, MAX_STOP_RADIUS_M)),
        );
    }

    let reply = state
        .pipeline
        .lookup(Intent::NearestStop, &entities, Some(origin))
        .await;
    (StatusCode::OK, Json(reply)).into_response()
}

async fn route(State(state): State<ApiState>, Query(query): Query<RouteQuery>) -> Response {
    let origin = match validate_location(&state, query.origin_lat, query.origin_lon) {
        Ok(origin) => origin,
        Err(response) => return response,
    };
    let destination = match validate_location(&state, query.destination_lat, query.destination_lon)
    {
        Ok(destination) => destination,
        Err(response) => return response,
    };

    let mode = match query.mode.as_deref().map(TransportMode::parse) {
        None => TransportMode::Foot,
        Some(Some(mode)) => mode,
        Some(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_mode",
                "mode must be one of foot, bike, car, bus",
            )
        }
    };

    let mut entities = EntitySet::new()
        .with(EntityKind::OriginCoords, EntityValue::Coords(origin))
        .with(EntityKind::DestinationCoords, EntityValue::Coords(destination))
        .with(EntityKind::Mode, EntityValue::Mode(mode));
    if let Some(name) = free_text(query.destination_name) {
        entities.insert(EntityKind::Place, EntityValue::Text(name));
    }
    if let Some(zone) = free_text(query.zone) {
        entities.insert(EntityKind::Zone, EntityValue::Text(zone));
    }

    let reply = state
        .pipeline
        .lookup(Intent::Route, &entities, Some(origin))
        .await;
    (StatusCode::OK, Json(reply)).into_response()
}

async fn traffic(State(state): State<ApiState>, Query(query): Query<TrafficQuery>) -> Response {
    let entities = text_entities(EntityKind::Zone, query.zone);
    let reply = state
        .pipeline
        .lookup(Intent::TrafficStatus, &entities, None)
        .await;
    (StatusCode::OK, Json(reply)).into_response()
}

async fn accessibility(
    State(state): State<ApiState>,
    Query(query): Query<AccessibilityQuery>,
) -> Response {
    let entities = text_entities(EntityKind::Place, query.place);
    let reply = state
        .pipeline
        .lookup(Intent::AccessibilityInfo, &entities, None)
        .await;
    (StatusCode::OK, Json(reply)).into_response()
}

async fn geocode(State(state): State<ApiState>, Query(query): Query<GeocodeQuery>) -> Response {
    let entities = text_entities(EntityKind::Place, query.address);
    let reply = state
        .pipeline
        .lookup(Intent::Geocode, &entities, None)
        .await;
    (StatusCode::OK, Json(reply)).into_response()
}

async fn audio(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.pipeline.audio().load(&name).await {
        Ok(Some(bytes)) => {
            let content_type = match name.rsplit_once('.').map(|(_, extension)| extension) {
                Some("wav") => "audio/wav",
                Some("ogg") => "audio/ogg",
                _ => "audio/mpeg",
            };
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
                bytes,
            )
                .into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "not_found", "audio file not found"),
        Err(AudioStoreError::InvalidName(_)) => error_response(
            StatusCode::BAD_REQUEST,
            "invalid_audio_name",
            "audio names look like tts_<uuid>.mp3",
        ),
        Err(error) => {
            warn!(error = %error, "failed to read stored audio");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "audio_unavailable",
                "stored audio could not be read",
            )
        }
    }
}

fn validate_location(state: &ApiState, lat: f64, lon: f64) -> Result<Location, Response> {
    state
        .pipeline
        .options()
        .region
        .validate(lat, lon)
        .map_err(query_error_response)
}

fn free_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(|value| value.chars().take(MAX_FREE_TEXT_PARAM_LEN).collect())
}

/// Absent or blank parameters leave the entity out, so the dispatcher answers
/// with its missing-parameter prompt.
fn text_entities(kind: EntityKind, value: Option<String>) -> EntitySet {
    let mut entities = EntitySet::new();
    if let Some(value) = free_text(value) {
        entities.insert(kind, EntityValue::Text(value));
    }
    entities
}

fn query_error_response(error: QueryError) -> Response {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, error.code(), &error.to_string())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message
        })),
    )
        .into_response()
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if request.method() == Method::OPTIONS || is_public_endpoint(path.as_str()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid x-api-key",
        );
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded for this IP",
        );
    }

    next.run(request).await
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}

fn parse_allowed_origins() -> Vec<String> {
    let default_origins = [
        "http://localhost:5500",
        "http://127.0.0.1:5500",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    env::var("AURA_ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| {
            default_origins
                .iter()
                .map(|value| value.to_string())
                .collect()
        })
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5500")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}
