//! HTTP client for one environment's gateway admin API.
//!
//! All writes are idempotent PUT/DELETE against deterministic resource ids
//! (see [`crate::ids`]), so callers may retry a whole operation after any
//! failure. The client itself never retries; retry policy belongs to the
//! caller.

use http::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Shared-secret header expected by the admin API on every call.
pub const ADMIN_KEY_HEADER: &str = "X-API-KEY";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum GatewaySyncError {
    /// The admin API answered with an error status; the body is kept
    /// verbatim for diagnostics.
    #[error("admin API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("admin API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct AdminClient {
    client: reqwest::Client,
    base_url: String,
    admin_key: String,
}

impl AdminClient {
    /// A timed-out call surfaces as a `Transport` error, never as assumed
    /// success.
    pub fn new(admin_url: &str, admin_key: &str, timeout: Duration) -> Result<Self, GatewaySyncError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(AdminClient {
            client,
            base_url: admin_url.trim_end_matches('/').to_string(),
            admin_key: admin_key.to_string(),
        })
    }

    pub async fn upsert_service(&self, id: &str, payload: &Value) -> Result<(), GatewaySyncError> {
        self.put(&format!("services/{id}"), payload).await
    }

    pub async fn upsert_route(&self, id: &str, payload: &Value) -> Result<(), GatewaySyncError> {
        self.put(&format!("routes/{id}"), payload).await
    }

    pub async fn upsert_upstream(&self, id: &str, payload: &Value) -> Result<(), GatewaySyncError> {
        self.put(&format!("upstreams/{id}"), payload).await
    }

    pub async fn delete_route(&self, id: &str) -> Result<(), GatewaySyncError> {
        self.delete(&format!("routes/{id}")).await
    }

    pub async fn delete_service(&self, id: &str) -> Result<(), GatewaySyncError> {
        self.delete(&format!("services/{id}")).await
    }

    async fn put(&self, path: &str, payload: &Value) -> Result<(), GatewaySyncError> {
        let url = format!("{}/admin/{}", self.base_url, path);
        tracing::debug!(url = %url, "admin PUT");

        let response = self
            .client
            .put(&url)
            .header(ADMIN_KEY_HEADER, &self.admin_key)
            .json(payload)
            .send()
            .await?;

        Self::check_status(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), GatewaySyncError> {
        let url = format!("{}/admin/{}", self.base_url, path);
        tracing::debug!(url = %url, "admin DELETE");

        let response = self
            .client
            .delete(&url)
            .header(ADMIN_KEY_HEADER, &self.admin_key)
            .send()
            .await?;

        // Already-deleted is not an error; deletes must be retryable.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<(), GatewaySyncError> {
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "admin API error");
            return Err(GatewaySyncError::Status { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockGateway;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_and_delete() {
        let gateway = MockGateway::spawn().await;
        let client = AdminClient::new(&gateway.admin_url(), "secret", DEFAULT_TIMEOUT).unwrap();

        client
            .upsert_service("cp-svc-1", &json!({"upstream_id": "u"}))
            .await
            .unwrap();
        assert!(gateway.has_resource("/admin/services/cp-svc-1"));

        client.delete_service("cp-svc-1").await.unwrap();
        assert!(!gateway.has_resource("/admin/services/cp-svc-1"));

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].api_key.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_resource() {
        let gateway = MockGateway::spawn().await;
        let client = AdminClient::new(&gateway.admin_url(), "secret", DEFAULT_TIMEOUT).unwrap();

        // Nothing was ever created under this id.
        client.delete_route("cp-rt-missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_failure_carries_body() {
        let gateway = MockGateway::spawn().await;
        gateway.fail_puts(true);
        let client = AdminClient::new(&gateway.admin_url(), "secret", DEFAULT_TIMEOUT).unwrap();

        let err = client
            .upsert_route("cp-rt-1", &json!({"uri": "/a"}))
            .await
            .unwrap_err();

        match err {
            GatewaySyncError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.contains("injected"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
