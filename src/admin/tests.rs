use super::AdminServer;
use crate::application::{
    ApplicationStatus, ApplicationStore, DisabledMirror, MemoryApplicationStore, MirrorDispatcher,
    SubmitterIdentity, WorkflowCoordinator,
};
use crate::bot::{ConnectionHealthSnapshot, ConnectionState};
use crate::config::ApplybotConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::health::{HealthReporter, StatusSource};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct FixedSource(ConnectionHealthSnapshot);

impl StatusSource for FixedSource {
    fn connection_status(&self) -> Result<ConnectionHealthSnapshot> {
        Ok(self.0.clone())
    }
}

struct Fixture {
    router: Router,
    coordinator: Arc<WorkflowCoordinator>,
    store: Arc<MemoryApplicationStore>,
}

fn fixture(source: Option<Arc<dyn StatusSource>>) -> Fixture {
    let config = ApplybotConfig::default();
    let event_bus = Arc::new(EventBus::new(32));
    let store = Arc::new(MemoryApplicationStore::new());
    let dispatcher = Arc::new(MirrorDispatcher::start(
        Arc::new(DisabledMirror),
        Arc::clone(&event_bus),
        8,
    ));
    let coordinator = Arc::new(WorkflowCoordinator::new(
        &config.application,
        store.clone(),
        dispatcher,
        event_bus,
    ));
    let reporter = HealthReporter::new(source, Duration::from_secs(600));
    let server = AdminServer::new(config.admin.clone(), Arc::clone(&coordinator), reporter);

    Fixture {
        router: server.router(),
        coordinator,
        store,
    }
}

async fn submit(coordinator: &WorkflowCoordinator) -> String {
    let content = [("name", "Jane"), ("contact", "@jane"), ("about", "hello")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let submitter = SubmitterIdentity {
        user_id: 9,
        chat_id: 9,
        username: None,
        first_name: Some("Jane".to_string()),
        last_name: None,
    };
    coordinator.submit(content, submitter).await.unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_without_source() {
    let f = fixture(None);
    let (status, body) = send(&f.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["bot"].is_null());
}

#[tokio::test]
async fn test_health_warning_is_still_200() {
    let snapshot = ConnectionHealthSnapshot {
        state: ConnectionState::Disconnected,
        is_polling_active: false,
        polling_started: None,
        reconnect_attempts: 12,
        time_since_last_message: Duration::from_secs(601),
    };
    let f = fixture(Some(Arc::new(FixedSource(snapshot))));
    let (status, body) = send(&f.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "warning");
    assert_eq!(body["message"], "Bot polling is not active");
    assert_eq!(body["bot"]["reconnectAttempts"], 12);
    assert_eq!(body["bot"]["timeSinceLastMessage"], "601s");
}

#[tokio::test]
async fn test_decide_via_api() {
    let f = fixture(None);
    let id = submit(&f.coordinator).await;

    let (status, body) = send(
        &f.router,
        post_json(
            &format!("/api/applications/{}/status", id),
            json!({"status": "approved", "adminNotes": "looks good"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let stored = f.store.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, ApplicationStatus::Approved);
    assert_eq!(stored.admin_notes.as_deref(), Some("looks good"));

    let (status, body) = send(&f.router, get(&format!("/api/applications/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["adminNotes"], "looks good");
}

#[tokio::test]
async fn test_decide_error_codes() {
    let f = fixture(None);
    let id = submit(&f.coordinator).await;
    let uri = format!("/api/applications/{}/status", id);

    let (status, body) = send(&f.router, post_json(&uri, json!({"status": "archived"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(&f.router, post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &f.router,
        post_json("/api/applications/unknown/status", json!({"status": "approved"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&f.router, post_json(&uri, json!({"status": "rejected"}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&f.router, post_json(&uri, json!({"status": "approved"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let stored = f.store.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, ApplicationStatus::Rejected);
}

#[tokio::test]
async fn test_list_get_and_stats() {
    let f = fixture(None);
    let first = submit(&f.coordinator).await;
    submit(&f.coordinator).await;
    f.coordinator.decide(&first, "approved", None).await.unwrap();

    let (status, body) = send(&f.router, get("/api/applications")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, _) = send(&f.router, get("/api/applications/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&f.router, get("/api/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"total": 2, "pending": 1, "approved": 1, "rejected": 0})
    );
}
