//! In-process stand-in for a gateway admin API.
//!
//! Records every call and keeps a resource map so deletes of unknown ids
//! answer 404, matching the real admin API closely enough for client and
//! orchestration tests.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::client::ADMIN_KEY_HEADER;

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
    pub api_key: Option<String>,
}

#[derive(Clone, Default)]
struct MockState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    resources: Arc<Mutex<HashMap<String, Value>>>,
    fail_puts: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

pub struct MockGateway {
    addr: SocketAddr,
    state: MockState,
    handle: tokio::task::JoinHandle<()>,
}

impl MockGateway {
    pub async fn spawn() -> Self {
        let state = MockState::default();
        let app = Router::new().fallback(handler).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock gateway");
        let addr = listener.local_addr().expect("mock gateway addr");

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        MockGateway { addr, state, handle }
    }

    pub fn admin_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().clear();
    }

    /// Make every subsequent PUT answer 500.
    pub fn fail_puts(&self, fail: bool) {
        self.state.fail_puts.store(fail, Ordering::Relaxed);
    }

    /// Make every subsequent DELETE answer 500.
    pub fn fail_deletes(&self, fail: bool) {
        self.state.fail_deletes.store(fail, Ordering::Relaxed);
    }

    pub fn has_resource(&self, path: &str) -> bool {
        self.state.resources.lock().contains_key(path)
    }

    pub fn resource(&self, path: &str) -> Option<Value> {
        self.state.resources.lock().get(path).cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.state.resources.lock().len()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let path = uri.path().to_string();
    let body_json: Option<Value> = serde_json::from_slice(&body).ok();
    let api_key = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    state.calls.lock().push(RecordedCall {
        method: method.to_string(),
        path: path.clone(),
        body: body_json.clone(),
        api_key,
    });

    match method {
        Method::PUT => {
            if state.fail_puts.load(Ordering::Relaxed) {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "injected failure".to_string(),
                );
            }
            state
                .resources
                .lock()
                .insert(path, body_json.unwrap_or(Value::Null));
            (StatusCode::OK, "{}".to_string())
        }
        Method::DELETE => {
            if state.fail_deletes.load(Ordering::Relaxed) {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "injected failure".to_string(),
                );
            }
            if state.resources.lock().remove(&path).is_some() {
                (StatusCode::OK, "{}".to_string())
            } else {
                (StatusCode::NOT_FOUND, "resource not found".to_string())
            }
        }
        _ => (StatusCode::METHOD_NOT_ALLOWED, String::new()),
    }
}
