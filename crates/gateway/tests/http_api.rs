//! End-to-end HTTP tests: the full `api::app` service over the in-process
//! engine, driven with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use cb_domain::config::{ArtifactFormat, Config};
use cb_domain::SessionId;
use cb_engine::{EngineEvent, MemoryEngine, SentMessage};
use cb_gateway::api;
use cb_gateway::bootstrap::build_app_state_with_engine;
use cb_gateway::state::AppState;

struct TestApp {
    state: AppState,
    engine: MemoryEngine,
    _dir: TempDir,
}

impl TestApp {
    fn app(&self) -> Router {
        api::app(self.state.clone())
    }

    async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn create(&self) -> SessionId {
        let (status, body) = self.post_json("/session/create", Value::Null).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        SessionId::parse(body["sessionId"].as_str().unwrap()).unwrap()
    }
}

async fn test_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.sessions.dir = dir.path().join("sessions");
    config.sessions.resume_on_start = false;
    config.pairing.format = ArtifactFormat::Text;
    config.server.api_token_env = "CB_HTTP_TEST_TOKEN_UNSET".into();
    tweak(&mut config);

    let engine = MemoryEngine::new();
    let state = build_app_state_with_engine(Arc::new(config), Arc::new(engine.clone()))
        .await
        .unwrap();
    TestApp {
        state,
        engine,
        _dir: dir,
    }
}

async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

// ── GET / ───────────────────────────────────────────────────────────

#[tokio::test]
async fn root_reports_running() {
    let app = test_app().await;
    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ChatBridge is running");
    assert_eq!(body["sessions"], 0);
}

// ── create / qr ─────────────────────────────────────────────────────

#[tokio::test]
async fn create_returns_session_id_and_opens_connection() {
    let app = test_app().await;
    let id = app.create().await;
    assert_eq!(app.engine.open_count(&id), 1);

    let (_, root) = app.get("/").await;
    assert_eq!(root["sessions"], 1);
}

#[tokio::test]
async fn qr_is_404_until_token_arrives() {
    let app = test_app().await;
    let id = app.create().await;

    let (status, body) = app.get(&format!("/session/{id}/qr")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "QR code not found");
    assert_eq!(body["sessionId"], id.as_str());
    assert_eq!(body["availableSessions"], serde_json::json!([]));

    assert!(app.engine.emit(&id, EngineEvent::PairingToken("tok-1".into())).await);

    let mut found = None;
    for _ in 0..200 {
        let (status, body) = app.get(&format!("/session/{id}/qr")).await;
        if status == StatusCode::OK {
            found = Some(body);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(found.expect("qr never appeared")["qr"], "tok-1");
}

#[tokio::test]
async fn qr_wait_is_released_by_token() {
    let app = test_app().await;
    let id = app.create().await;

    let waiter = {
        let router = app.app();
        let uri = format!("/session/{id}/qr?wait_ms=2000");
        tokio::spawn(async move {
            router
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap()
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    app.engine.emit(&id, EngineEvent::PairingToken("tok-7".into())).await;

    let resp = waiter.await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(resp.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["qr"], "tok-7");
}

#[tokio::test]
async fn qr_wait_on_unknown_session_is_404() {
    let app = test_app().await;
    let (status, body) = app.get("/session/nope/qr?wait_ms=50").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "QR code not found");
}

#[tokio::test]
async fn invalid_session_id_is_400() {
    let app = test_app().await;
    let (status, _) = app.get("/session/bad.id/qr").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blocking_create_returns_pairing_code() {
    let app = test_app().await;

    let creating = {
        let router = app.app();
        tokio::spawn(async move {
            router
                .oneshot(
                    Request::post("/session/create?wait=true")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap()
        })
    };

    let mut id = None;
    for _ in 0..400 {
        if let Some(info) = app.state.sessions.list().into_iter().next() {
            id = Some(info.session_id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let id = id.expect("session never registered");
    app.engine.emit(&id, EngineEvent::PairingToken("tok-blocking".into())).await;

    let resp = creating.await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(resp.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["sessionId"], id.as_str());
    assert_eq!(body["qr"], "tok-blocking");
}

#[tokio::test]
async fn blocking_create_times_out_with_504() {
    let app = test_app_with(|c| {
        c.pairing.block_on_create = true;
        c.pairing.wait_timeout_ms = 50;
    })
    .await;

    let (status, body) = app.post_json("/session/create", Value::Null).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "QR code not generated in time");
    assert!(body["sessionId"].is_string());
}

#[tokio::test]
async fn failed_engine_open_is_500() {
    let app = test_app().await;
    app.engine.fail_next_opens(1);
    let (status, body) = app.post_json("/session/create", Value::Null).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to create session");
    assert!(body["details"].is_string());
}

// ── send ────────────────────────────────────────────────────────────

#[tokio::test]
async fn send_normalizes_number() {
    let app = test_app().await;
    let id = app.create().await;

    let (status, body) = app
        .post_json(
            &format!("/session/{id}/send"),
            serde_json::json!({ "number": "79991234567", "message": "hello" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(
        app.engine.sent(),
        vec![SentMessage {
            session_id: id,
            to: "79991234567@s.whatsapp.net".into(),
            text: "hello".into(),
        }]
    );
}

#[tokio::test]
async fn send_to_unknown_session_is_404() {
    let app = test_app().await;
    let (status, body) = app
        .post_json(
            "/session/12345/send",
            serde_json::json!({ "number": "1", "message": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session not found");
    assert_eq!(body["sessionId"], "12345");
}

#[tokio::test]
async fn send_without_number_is_400() {
    let app = test_app().await;
    let id = app.create().await;
    let (status, body) = app
        .post_json(
            &format!("/session/{id}/send"),
            serde_json::json!({ "message": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "number is required");
    assert!(app.engine.sent().is_empty());
}

#[tokio::test]
async fn engine_send_failure_is_500() {
    let app = test_app().await;
    let id = app.create().await;
    app.engine.fail_sends(Some("socket gone".into()));
    let (status, body) = app
        .post_json(
            &format!("/session/{id}/send"),
            serde_json::json!({ "number": "1", "message": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to send message");
}

// ── status / list / delete ──────────────────────────────────────────

#[tokio::test]
async fn status_list_and_delete() {
    let app = test_app().await;
    let id = app.create().await;

    let (status, body) = app.get(&format!("/session/{id}/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], id.as_str());
    assert_eq!(body["state"], "connecting");

    let (_, body) = app.get("/sessions").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["sessions"][0]["sessionId"], id.as_str());

    let (status, body) = app
        .call(
            Request::delete(format!("/session/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(app.engine.is_closed(&id, 0));

    let (status, _) = app.get(&format!("/session/{id}/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get("/sessions").await;
    assert_eq!(body["count"], 0);
}

// ── CORS / origin guard ─────────────────────────────────────────────

#[tokio::test]
async fn disallowed_origin_is_403() {
    let app = test_app().await;
    let (status, body) = app
        .call(
            Request::post("/session/create")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "origin not allowed");
    assert!(app.state.sessions.list().is_empty());
}

#[tokio::test]
async fn allowed_origin_gets_cors_headers() {
    let app = test_app().await;
    let resp = app
        .app()
        .oneshot(
            Request::get("/")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3000"
    );
}

#[tokio::test]
async fn preflight_from_allowed_origin_succeeds() {
    let app = test_app().await;
    let resp = app
        .app()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/session/create")
                .header(header::ORIGIN, "http://127.0.0.1:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://127.0.0.1:5173"
    );
}

#[tokio::test]
async fn request_without_origin_passes() {
    let app = test_app().await;
    let (status, _) = app.get("/sessions").await;
    assert_eq!(status, StatusCode::OK);
}

// ── auth ────────────────────────────────────────────────────────────

#[tokio::test]
async fn bearer_token_guards_session_routes() {
    std::env::set_var("CB_HTTP_TEST_TOKEN_SET", "s3cret");
    let app = test_app_with(|c| c.server.api_token_env = "CB_HTTP_TEST_TOKEN_SET".into()).await;

    let (status, body) = app.get("/sessions").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid or missing API token");

    let (status, _) = app
        .call(
            Request::get("/sessions")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .call(
            Request::get("/sessions")
                .header(header::AUTHORIZATION, "Bearer s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Liveness stays public.
    let (status, _) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
}
