use crate::{handlers::*, state::AppState, websocket::handler::presence_ws};
use axum::{routing::{get, post}, Router};
use std::sync::Arc;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .route("/moments/:moment_id/join", post(presence_join))
        .route("/moments/:moment_id/leave", post(presence_leave))
        .route("/moments/:moment_id/presence", get(presence_count))
        .route("/moments/:moment_id/presence/stats", get(presence_stats))
        .route("/moments/:moment_id/simulation", get(simulation_status))
        .route("/moments/:moment_id/simulation/start", post(simulation_start))
        .route("/moments/:moment_id/simulation/stop", post(simulation_stop))
        .with_state(state)
}

/// Create the WebSocket push routes
pub fn create_ws_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/presence/:moment_id", get(presence_ws))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{MemoryStore, StoreBackend};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Arc<AppState>, Router) {
        let config = Config {
            sim_presence_step_ms: 50,
            ..Config::default()
        };
        let state = AppState::new(config, StoreBackend::Memory(MemoryStore::new()));
        (state.clone(), create_api_routes(state))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn join_leave_and_count_over_http() {
        let (_, app) = app();
        let (status, body) = call(&app, Method::POST, "/moments/room1/join", Some(json!({"userId": "u1"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"count": 1}));

        let (_, body) = call(&app, Method::POST, "/moments/room1/join", Some(json!({"userId": "u2"}))).await;
        assert_eq!(body, json!({"count": 2}));

        let (_, body) = call(&app, Method::GET, "/moments/room1/presence", None).await;
        assert_eq!(body, json!({"count": 2}));

        let (_, body) = call(&app, Method::POST, "/moments/room1/leave", Some(json!({"userId": "u1"}))).await;
        assert_eq!(body, json!({"count": 1}));
    }

    #[tokio::test]
    async fn empty_user_id_is_a_bad_request() {
        let (_, app) = app();
        let (status, body) = call(&app, Method::POST, "/moments/room1/join", Some(json!({"userId": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!(400));
    }

    #[tokio::test]
    async fn room_id_with_separator_is_a_bad_request() {
        let (_, app) = app();
        let (status, _) = call(&app, Method::POST, "/moments/a:sim:lock/join", Some(json!({"userId": "u1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, Method::POST, "/moments/a:sim:lock/simulation/stop", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_reject_malformed_window() {
        let (_, app) = app();
        let (status, _) = call(&app, Method::GET, "/moments/room1/presence/stats?window=soon", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(&app, Method::POST, "/moments/room1/join", Some(json!({"userId": "u1"}))).await;
        let (status, body) = call(&app, Method::GET, "/moments/room1/presence/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["peak"].as_u64().unwrap() >= 1);
        assert!(body["windowStart"].as_str().unwrap().ends_with(":00.000Z"));
    }

    #[tokio::test]
    async fn simulation_start_is_reported_once() {
        let (state, app) = app();
        let (status, body) = call(&app, Method::POST, "/moments/abc/simulation/start", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, json!({"outcome": "started"}));

        let (_, body) = call(&app, Method::POST, "/moments/abc/simulation/start", None).await;
        assert_eq!(body, json!({"outcome": "already_running"}));

        let (_, body) = call(&app, Method::GET, "/moments/abc/simulation", None).await;
        assert_eq!(body, json!({"running": true}));

        let (status, _) = call(&app, Method::POST, "/moments/abc/simulation/stop", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(!state.simulator.is_running("abc"));
    }

    #[tokio::test]
    async fn ready_reports_the_store_backend() {
        let (_, app) = app();
        let (status, body) = call(&app, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], json!("memory"));
    }

    #[tokio::test]
    async fn join_is_relayed_to_push_subscribers() {
        let (state, app) = app();
        let mut rx = state.hub.subscribe("room1").await;
        call(&app, Method::POST, "/moments/room1/join", Some(json!({"userId": "u1"}))).await;
        assert_eq!(rx.recv().await.unwrap(), 1);
    }
}
