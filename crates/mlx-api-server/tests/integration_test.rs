use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mlx_api_runtime::MockRuntime;
use mlx_api_server::{create_router, AppState, LifecycleManager, ServerState, Settings};
use serde_json::{json, Value};
use tower::ServiceExt;

const MODEL: &str = "mlx-community/Llama-3.2-3B-Instruct-4bit";

fn test_settings() -> Settings {
    Settings {
        model_id: MODEL.to_string(),
        ..Settings::default()
    }
}

async fn loaded_app(runtime: MockRuntime, settings: Settings) -> (Router, Arc<ServerState>) {
    let state = Arc::new(ServerState::new());
    let lifecycle = LifecycleManager::new(Arc::new(runtime), Arc::clone(&state));
    lifecycle.start(&settings).await.unwrap();
    let app = create_router(AppState::new(Arc::clone(&state), Arc::new(settings)));
    (app, state)
}

fn unloaded_app() -> Router {
    create_router(AppState::new(
        Arc::new(ServerState::new()),
        Arc::new(test_settings()),
    ))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn raw_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body)
        .unwrap_or_else(|_| panic!("non-JSON body: {}", String::from_utf8_lossy(&body)));
    (status, json)
}

fn hello() -> Value {
    json!({
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Hello"}
        ],
        "max_tokens": 50
    })
}

// -- Health / stats --

#[tokio::test]
async fn health_before_load_is_unhealthy() {
    let (status, json) = send(unloaded_app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["model_loaded"], false);
    assert_eq!(json["uptime_seconds"], 0.0);
}

#[tokio::test]
async fn health_after_load_is_healthy() {
    let (app, _) = loaded_app(MockRuntime::new(), test_settings()).await;
    let (status, json) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model"], MODEL);
    assert_eq!(json["model_loaded"], true);
    assert!(json["uptime_seconds"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn stats_start_at_zero() {
    let (app, _) = loaded_app(MockRuntime::new(), test_settings()).await;
    let (status, json) = send(app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["model"], MODEL);
    assert_eq!(json["total_requests"], 0);
    assert_eq!(json["total_tokens_generated"], 0);
    assert!(json["model_load_time_seconds"].as_f64().unwrap() >= 0.0);
    assert!(json["uptime_seconds"].as_f64().unwrap() >= 0.0);
}

// -- Generate --

#[tokio::test]
async fn generate_round_trip() {
    let runtime = MockRuntime::new().with_reply("Hello! How can I help?");
    let (app, _) = loaded_app(runtime, test_settings()).await;

    let (status, json) = send(app.clone(), json_request("/generate", hello())).await;
    assert_eq!(status, StatusCode::OK, "body: {json}");
    assert_eq!(json["response"], "Hello! How can I help?");
    assert_eq!(json["tokens_generated"], 5);
    assert_eq!(json["model"], MODEL);
    assert!(json["generation_time_ms"].is_u64());

    let (_, stats) = send(app, get("/stats")).await;
    assert_eq!(stats["total_requests"], 1);
    assert_eq!(stats["total_tokens_generated"], 5);
}

#[tokio::test]
async fn generate_applies_defaults() {
    let runtime = MockRuntime::new();
    let probe = runtime.probe();
    let (app, _) = loaded_app(runtime, test_settings()).await;

    let body = json!({"messages": [{"role": "user", "content": "echo me back"}]});
    let (status, json) = send(app, json_request("/generate", body)).await;
    assert_eq!(status, StatusCode::OK, "body: {json}");
    assert_eq!(json["response"], "echo me back");

    let params = probe.last_params().unwrap();
    assert_eq!(params.max_tokens, 512);
    assert!((params.temperature - 0.7).abs() < f32::EPSILON);
    assert!((params.top_p - 0.9).abs() < f32::EPSILON);
}

#[tokio::test]
async fn generate_clamps_to_server_ceiling() {
    let runtime = MockRuntime::new().with_reply("ok");
    let probe = runtime.probe();
    let settings = Settings {
        max_output_tokens: 1024,
        ..test_settings()
    };
    let (app, _) = loaded_app(runtime, settings).await;

    let body = json!({"messages": [{"role": "user", "content": "hi"}], "max_tokens": 2000});
    let (status, _) = send(app, json_request("/generate", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(probe.last_params().unwrap().max_tokens, 1024);
}

#[tokio::test]
async fn generate_before_load_is_503() {
    let (status, json) = send(unloaded_app(), json_request("/generate", hello())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "Service unavailable");
    assert!(json["detail"].as_str().unwrap().contains("Model not loaded"));
}

#[tokio::test]
async fn malformed_json_before_load_is_503() {
    let (status, _) = send(unloaded_app(), raw_request("/generate", "{not json")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let (app, state) = loaded_app(MockRuntime::new(), test_settings()).await;
    let (status, json) = send(app, raw_request("/generate", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid request");
    assert!(json["detail"].is_string());
    assert_eq!(state.snapshot().request_count, 0);
}

#[tokio::test]
async fn wrong_field_type_is_400() {
    let (app, _) = loaded_app(MockRuntime::new(), test_settings()).await;
    let body = json!({"messages": [{"role": "user", "content": "hi"}], "max_tokens": "many"});
    let (status, _) = send(app, json_request("/generate", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_messages_is_400() {
    let (app, _) = loaded_app(MockRuntime::new(), test_settings()).await;
    let (status, json) = send(app, json_request("/generate", json!({"messages": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid request");
}

#[tokio::test]
async fn unknown_role_is_400() {
    let runtime = MockRuntime::new();
    let probe = runtime.probe();
    let (app, _) = loaded_app(runtime, test_settings()).await;
    let body = json!({"messages": [{"role": "robot", "content": "beep"}]});
    let (status, json) = send(app, json_request("/generate", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].as_str().unwrap().contains("robot"));
    assert_eq!(probe.generate_calls(), 0);
}

#[tokio::test]
async fn out_of_range_parameters_are_400() {
    let (app, _) = loaded_app(MockRuntime::new(), test_settings()).await;
    for (field, value) in [
        ("max_tokens", json!(0)),
        ("max_tokens", json!(2049)),
        ("temperature", json!(2.5)),
        ("temperature", json!(-0.1)),
        ("top_p", json!(1.5)),
    ] {
        let mut body = json!({"messages": [{"role": "user", "content": "hi"}]});
        body[field] = value.clone();
        let (status, json) = send(app.clone(), json_request("/generate", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{field}={value}: {json}");
        assert!(json["detail"].as_str().unwrap().contains(field));
    }
}

#[tokio::test]
async fn input_too_long_is_400() {
    let runtime = MockRuntime::new();
    let probe = runtime.probe();
    let settings = Settings {
        max_input_tokens: 16,
        ..test_settings()
    };
    let (app, state) = loaded_app(runtime, settings).await;

    let long = vec!["word"; 64].join(" ");
    let body = json!({"messages": [{"role": "user", "content": long}]});
    let (status, json) = send(app, json_request("/generate", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Input too long");
    assert!(json["detail"].as_str().unwrap().contains("(max: 16)"));
    assert_eq!(probe.generate_calls(), 0);
    assert_eq!(state.snapshot().request_count, 0);
}

#[tokio::test]
async fn reserved_template_marker_is_400() {
    let runtime = MockRuntime::new();
    let probe = runtime.probe();
    let (app, state) = loaded_app(runtime, test_settings()).await;

    let body = json!({"messages": [{"role": "user", "content": "what does <|eot_id|> mean?"}]});
    let (status, json) = send(app, json_request("/generate", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "body: {json}");
    assert_eq!(json["error"], "Invalid request");
    assert!(json["detail"].as_str().unwrap().contains("<|eot_id|>"));
    assert_eq!(probe.generate_calls(), 0);
    assert_eq!(state.snapshot().request_count, 0);
}

#[tokio::test]
async fn runtime_error_is_500_and_server_keeps_serving() {
    let runtime = MockRuntime::new().with_generate_error("metal device lost");
    let (app, state) = loaded_app(runtime, test_settings()).await;

    let (status, json) = send(app.clone(), json_request("/generate", hello())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Generation failed");
    assert!(json["detail"].as_str().unwrap().contains("metal device lost"));
    assert_eq!(state.snapshot().request_count, 0);

    let (status, json) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn runtime_panic_is_500() {
    let runtime = MockRuntime::new().with_generate_panic();
    let (app, _) = loaded_app(runtime, test_settings()).await;

    let (status, json) = send(app.clone(), json_request("/generate", hello())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["detail"].as_str().unwrap().starts_with("runtime panicked"));

    let (status, _) = send(app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn slow_generation_times_out_with_504() {
    let runtime = MockRuntime::new().with_generate_delay(Duration::from_millis(300));
    let settings = Settings {
        request_timeout: Duration::from_millis(50),
        ..test_settings()
    };
    let (app, _) = loaded_app(runtime, settings).await;

    let (status, json) = send(app, json_request("/generate", hello())).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["error"], "Generation timed out");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let resp = unloaded_app().oneshot(get("/v1/models")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_headers_present() {
    let req = Request::builder()
        .uri("/health")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let resp = unloaded_app().oneshot(req).await.unwrap();
    assert!(resp.headers().contains_key("access-control-allow-origin"));
}

