//! Typed bodies for the admin API's service, route and upstream resources.
//!
//! These mirror the admin API schema closely enough to round-trip caller
//! payloads; `None` fields stay off the wire. The `id`, `create_time` and
//! `update_time` fields are owned by the gateway and never appear here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Set at deploy time from the resolved upstream binding, never stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<serde_json::Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_websocket: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl ServiceSpec {
    /// Builds the deployable service body: the stored spec with the
    /// resolved upstream id injected and a description fallback.
    pub fn to_payload(&self, upstream_id: &str, fallback_desc: &str) -> Value {
        let mut spec = self.clone();
        spec.upstream_id = Some(upstream_id.to_string());
        if spec.desc.is_none() {
            spec.desc = Some(fallback_desc.to_string());
        }
        serde_json::to_value(spec).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uris: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vars: Option<Vec<Value>>,
    /// Back-reference to the owning service; stamped at revision creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_config_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<serde_json::Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_websocket: Option<bool>,
    /// 1 = enabled, 0 = disabled. Defaults to enabled on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

impl RouteSpec {
    /// Builds the deployable route body: the stored spec as-is, enabled
    /// unless the caller said otherwise.
    pub fn to_payload(&self) -> Value {
        let mut spec = self.clone();
        if spec.status.is_none() {
            spec.status = Some(1);
        }
        serde_json::to_value(spec).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<f64>,
}

/// Upstream nodes as accepted by the admin API. Callers may supply either
/// shape; the wire form is always the weighted map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpstreamNodes {
    /// `{"host:port": weight}`
    Weighted(BTreeMap<String, u32>),
    /// `[{"host": ..., "port": ..., "weight": ...}]`
    List(Vec<UpstreamNode>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpstreamNode {
    pub host: String,
    pub port: u16,
    pub weight: u32,
}

impl UpstreamNodes {
    pub fn to_weighted(&self) -> BTreeMap<String, u32> {
        match self {
            UpstreamNodes::Weighted(map) => map.clone(),
            UpstreamNodes::List(nodes) => nodes
                .iter()
                .map(|n| (format!("{}:{}", n.host, n.port), n.weight))
                .collect(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TargetUrlError {
    #[error("invalid target url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("target url has no host")]
    MissingHost,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Load-balancing algorithm; the gateway defaults to roundrobin.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub lb_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<UpstreamNodes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_pool: Option<Value>,
}

impl UpstreamSpec {
    /// Derives a single-node upstream from a backend URL. Scheme and port
    /// default from the URL (80/443); hosts are passed through untouched so
    /// TLS SNI keeps working.
    pub fn from_target_url(name: &str, target_url: &str) -> Result<Self, TargetUrlError> {
        let url = Url::parse(target_url)?;
        let host = url.host_str().ok_or(TargetUrlError::MissingHost)?;
        let port = url
            .port()
            .unwrap_or(if url.scheme() == "https" { 443 } else { 80 });

        let mut nodes = BTreeMap::new();
        nodes.insert(format!("{host}:{port}"), 1);

        Ok(UpstreamSpec {
            name: Some(name.to_string()),
            lb_type: Some("roundrobin".to_string()),
            scheme: Some(url.scheme().to_string()),
            pass_host: Some("node".to_string()),
            nodes: Some(UpstreamNodes::Weighted(nodes)),
            ..UpstreamSpec::default()
        })
    }

    /// Builds the wire body with nodes normalized to the weighted map form.
    pub fn to_payload(&self) -> Value {
        let mut spec = self.clone();
        if let Some(nodes) = &self.nodes {
            spec.nodes = Some(UpstreamNodes::Weighted(nodes.to_weighted()));
        }
        if spec.desc.is_none() {
            spec.desc = spec.name.clone();
        }
        serde_json::to_value(spec).unwrap_or(Value::Null)
    }
}
