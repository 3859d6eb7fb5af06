//! In-process stand-in for the detection backend, serving the same routes
//! and error bodies on an ephemeral port.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

const SCENARIO_UPLOAD: &str = r#"{
    "video_url": "/media/out.mp4",
    "heatmap_url": "/media/hm.jpg",
    "total_tracked_vehicles": 12,
    "wrong_way_count": 1,
    "violations": [
        {"track_id": 3, "lane": "LEFT", "direction_detected": "UP",
         "timestamp_ms": 4200, "evidence_image_url": "/media/v3.jpg"}
    ],
    "lane_changes": []
}"#;

fn default_analytics() -> Value {
    json!({
        "total_videos_processed": 0,
        "total_tracked_vehicles": 0,
        "total_wrong_way": 0,
        "total_lane_changes": 0,
        "violations_per_lane": {"LEFT": 0, "RIGHT": 0},
        "heatmap_accumulated": "heatmap.jpg"
    })
}

struct StoredViolation {
    id: i64,
    filename: String,
}

struct Inner {
    requests: usize,
    next_id: i64,
    violations: Vec<StoredViolation>,
    upload_reply: Option<(StatusCode, String)>,
    last_upload_content_type: Option<String>,
    analytics: Value,
    analytics_failure: Option<StatusCode>,
    analytics_delay: Option<Duration>,
    reset_failure: Option<StatusCode>,
    heatmap: Option<Vec<u8>>,
    heatmap_cache_busters: Vec<String>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            requests: 0,
            next_id: 1,
            violations: Vec::new(),
            upload_reply: None,
            last_upload_content_type: None,
            analytics: default_analytics(),
            analytics_failure: None,
            analytics_delay: None,
            reset_failure: None,
            heatmap: None,
            heatmap_cache_busters: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBackend {
    /// Binds `127.0.0.1:0`, serves in the background and returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/upload/", post(upload_handler))
            .route("/violations", get(list_handler))
            .route("/violations/{id}", delete(delete_by_id_handler))
            .route("/violation-image", delete(delete_by_filename_handler))
            .route("/analytics", get(analytics_handler))
            .route("/reset", post(reset_handler))
            .route("/heatmap", get(heatmap_handler))
            .layer(DefaultBodyLimit::disable())
            .layer(middleware::from_fn_with_state(self.clone(), count_requests))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub fn request_count(&self) -> usize {
        self.inner.lock().unwrap().requests
    }

    pub fn set_upload_reply(&self, status: StatusCode, body: &str) {
        self.inner.lock().unwrap().upload_reply = Some((status, body.to_string()));
    }

    pub fn last_upload_content_type(&self) -> Option<String> {
        self.inner.lock().unwrap().last_upload_content_type.clone()
    }

    pub fn add_violation(&self, filename: &str) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.violations.push(StoredViolation {
            id,
            filename: filename.to_string(),
        });
        id
    }

    pub fn set_analytics(&self, analytics: Value) {
        self.inner.lock().unwrap().analytics = analytics;
    }

    pub fn fail_analytics(&self, status: StatusCode) {
        self.inner.lock().unwrap().analytics_failure = Some(status);
    }

    pub fn delay_analytics(&self, delay: Duration) {
        self.inner.lock().unwrap().analytics_delay = Some(delay);
    }

    pub fn fail_reset(&self, status: StatusCode) {
        self.inner.lock().unwrap().reset_failure = Some(status);
    }

    pub fn set_heatmap(&self, jpeg: Vec<u8>) {
        self.inner.lock().unwrap().heatmap = Some(jpeg);
    }

    pub fn heatmap_cache_busters(&self) -> Vec<String> {
        self.inner.lock().unwrap().heatmap_cache_busters.clone()
    }
}

async fn count_requests(State(backend): State<FakeBackend>, req: Request, next: Next) -> Response {
    backend.inner.lock().unwrap().requests += 1;
    next.run(req).await
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn upload_handler(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    _body: Bytes,
) -> Response {
    let mut inner = backend.inner.lock().unwrap();
    inner.last_upload_content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (status, body) = inner
        .upload_reply
        .clone()
        .unwrap_or((StatusCode::OK, SCENARIO_UPLOAD.to_string()));
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn list_handler(State(backend): State<FakeBackend>) -> Response {
    let inner = backend.inner.lock().unwrap();
    let items: Vec<Value> = inner
        .violations
        .iter()
        .map(|v| {
            json!({
                "id": v.id,
                "filename": v.filename,
                "image_path": format!("/violators/{}", v.filename),
            })
        })
        .collect();
    Json(items).into_response()
}

async fn delete_by_id_handler(
    State(backend): State<FakeBackend>,
    Path(id): Path<i64>,
) -> Response {
    let mut inner = backend.inner.lock().unwrap();
    let before = inner.violations.len();
    inner.violations.retain(|v| v.id != id);
    if inner.violations.len() == before {
        return detail(StatusCode::NOT_FOUND, "Violation not found");
    }
    Json(json!({ "message": "Deleted" })).into_response()
}

async fn delete_by_filename_handler(
    State(backend): State<FakeBackend>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let filename = query.get("filename").cloned().unwrap_or_default();
    if filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
    {
        return detail(StatusCode::BAD_REQUEST, "Invalid filename");
    }

    let mut inner = backend.inner.lock().unwrap();
    let before = inner.violations.len();
    inner.violations.retain(|v| v.filename != filename);
    if inner.violations.len() == before {
        return detail(StatusCode::NOT_FOUND, "File not found");
    }
    Json(json!({ "message": "Deleted" })).into_response()
}

async fn analytics_handler(State(backend): State<FakeBackend>) -> Response {
    let delay = backend.inner.lock().unwrap().analytics_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let inner = backend.inner.lock().unwrap();
    if let Some(status) = inner.analytics_failure {
        return (status, "analytics store offline").into_response();
    }
    Json(inner.analytics.clone()).into_response()
}

async fn reset_handler(State(backend): State<FakeBackend>) -> Response {
    let mut inner = backend.inner.lock().unwrap();
    if let Some(status) = inner.reset_failure {
        return detail(status, "reset failed on disk");
    }
    inner.analytics = default_analytics();
    inner.violations.clear();
    inner.heatmap = None;
    Json(json!({ "message": "All analytics and data reset successfully." })).into_response()
}

async fn heatmap_handler(
    State(backend): State<FakeBackend>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = backend.inner.lock().unwrap();
    if let Some(t) = query.get("t") {
        inner.heatmap_cache_busters.push(t.clone());
    }
    match inner.heatmap.clone() {
        Some(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        None => detail(StatusCode::NOT_FOUND, "No heatmap yet."),
    }
}
