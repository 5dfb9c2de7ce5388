use std::time::Duration;

use aura_api::{build_app_with, ApiConfig};
use aura_pipeline::PipelineSettings;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const API_KEY: &str = "integration-key";

async fn test_app() -> (Router, TempDir) {
    let audio_dir = tempfile::tempdir().expect("temp dir");
    let mut settings = PipelineSettings::offline(audio_dir.path());
    settings.options.synthesis_enabled = false;

    let config = ApiConfig {
        api_key: API_KEY.to_string(),
        rate_limit_window: Duration::from_secs(60),
        rate_limit_max: 100,
        allowed_origins: Vec::new(),
    };

    let app = build_app_with(settings, config)
        .await
        .expect("app should build");
    (app, audio_dir)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["capabilities"]["store"], "memory");
    assert_eq!(parsed["capabilities"]["synthesis"], false);
    assert!(parsed["metrics"].get("queries_total").is_some());
}

#[tokio::test]
async fn queries_require_api_key() {
    let (app, _audio) = test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/text-query")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "hola" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn text_query_answers_nearest_stop() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/v1/text-query",
            json!({
                "text": "¿Dónde está la parada de autobús más cercana?",
                "lat": 39.4699,
                "lon": -0.3763
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;

    assert_eq!(parsed["intent"], "nearest_stop");
    assert!(parsed["confidence"].as_f64().unwrap() >= 0.9);
    assert_eq!(parsed["outcome"]["outcome"], "success");
    assert!(parsed["audio_reference"].is_null());

    let reply = parsed["reply_text"].as_str().unwrap();
    assert!(reply.contains("Plaza del Ayuntamiento"), "{reply}");
    assert!(reply.contains("metros"), "{reply}");
}

#[tokio::test]
async fn gibberish_text_gets_clarification() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(post_json("/v1/text-query", json!({ "text": "blorp zzkq wiffle" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["intent"], "unknown");
    assert_eq!(parsed["confidence"].as_f64().unwrap(), 0.0);
    assert!(parsed["outcome"].is_null());
    assert!(!parsed["reply_text"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn text_query_rejects_half_a_location() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/v1/text-query",
            json!({ "text": "parada más cercana", "lat": 39.47 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn voice_query_outside_region_is_invalid_location() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/v1/voice-query",
            json!({ "audio_base64": "UklGRg==", "lat": 0.0, "lon": 0.0 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["error"], "invalid_location");
}

#[tokio::test]
async fn voice_query_without_recognizer_is_recognition_failure() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/v1/voice-query",
            json!({ "audio_base64": "UklGRg==", "lat": 39.4699, "lon": -0.3763 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["error"], "recognition_failure");
}

#[tokio::test]
async fn voice_query_rejects_bad_base64() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/v1/voice-query",
            json!({ "audio_base64": "not base64!", "lat": 39.4699, "lon": -0.3763 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_audio");
}

#[tokio::test]
async fn nearest_stops_endpoint_returns_stops() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(get("/v1/stops/nearest?lat=39.4699&lon=-0.3763&radius=400"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["outcome"]["outcome"], "success");
    assert_eq!(parsed["outcome"]["payload"]["kind"], "stops");
    assert_eq!(parsed["outcome"]["payload"]["data"]["radius_m"], 400);
    assert!(parsed["reply_text"]
        .as_str()
        .unwrap()
        .contains("Plaza del Ayuntamiento"));
}

#[tokio::test]
async fn traffic_without_zone_asks_for_one() {
    let (app, _audio) = test_app().await;

    let response = app.oneshot(get("/v1/traffic")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["outcome"]["outcome"], "not_found");
    assert!(parsed["reply_text"].as_str().unwrap().contains("zona"));
}

#[tokio::test]
async fn traffic_resolves_zone_aliases() {
    let (app, _audio) = test_app().await;

    let response = app.oneshot(get("/v1/traffic?zone=russafa")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["outcome"]["outcome"], "success");
    assert_eq!(parsed["outcome"]["payload"]["data"]["zone"], "Ruzafa");
}

#[tokio::test]
async fn route_rejects_unknown_mode() {
    let (app, _audio) = test_app().await;

    let response = app
        .oneshot(get(
            "/v1/route?origin_lat=39.4699&origin_lon=-0.3763&destination_lat=39.4549&destination_lon=-0.3505&mode=teleport",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_mode");
}

#[tokio::test]
async fn audio_endpoint_validates_names() {
    let (app, _audio) = test_app().await;

    let response = app
        .clone()
        .oneshot(get("/v1/audio/passwd"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get("/v1/audio/tts_6f1c2d3e-4b5a-4c6d-8e7f-9a0b1c2d3e4f.mp3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
