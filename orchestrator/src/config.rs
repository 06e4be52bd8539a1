use gateway::ids::{self, ResourceKind};
use gateway::spec::UpstreamSpec;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Settings for talking to environment gateways. One shared admin secret
/// covers every environment; the admin URL itself comes from the
/// environment registry per call.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GatewayConfig {
    pub admin_key: String,
    /// Per-call timeout for admin API requests.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause between route deletions and the service deletion on undeploy,
    /// so the gateway observes the routes as gone first.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    500
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Environment record seeded from config for single-process deployments;
/// production setups resolve environments from their own registry service.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EnvironmentSeed {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub admin_url: String,
}

impl EnvironmentSeed {
    pub fn into_environment(self) -> registry::types::Environment {
        registry::types::Environment {
            id: self.id,
            org_id: self.org_id,
            name: self.name,
            admin_url: self.admin_url,
        }
    }
}

/// Upstream record seeded from config. The gateway-side id is derived from
/// (environment, name) unless pinned explicitly.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamSeed {
    pub id: String,
    pub org_id: String,
    pub environment_id: String,
    pub name: String,
    pub spec: UpstreamSpec,
    #[serde(default)]
    pub gateway_id: Option<String>,
}

impl UpstreamSeed {
    pub fn into_upstream(self) -> registry::types::Upstream {
        let gateway_id = self.gateway_id.unwrap_or_else(|| {
            ids::generate(
                ResourceKind::Upstream,
                &format!("{}/{}", self.environment_id, self.name),
                &self.name,
            )
        });
        registry::types::Upstream {
            id: self.id,
            org_id: self.org_id,
            environment_id: self.environment_id,
            name: self.name,
            spec: self.spec,
            gateway_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub environments: Vec<EnvironmentSeed>,
    #[serde(default)]
    pub upstreams: Vec<UpstreamSeed>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn test_config_with_defaults() {
        let yaml = r#"
            gateway:
                admin_key: edd1c9f034335f136f87ad84b625c8f1
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");
        assert_eq!(config.gateway.timeout(), Duration::from_secs(30));
        assert_eq!(config.gateway.settle_delay(), Duration::from_millis(500));
        assert!(config.environments.is_empty());
        assert!(config.upstreams.is_empty());
    }

    #[test]
    fn test_config_with_environments() {
        let yaml = r#"
            gateway:
                admin_key: secret
                timeout_ms: 5000
                settle_ms: 0
            environments:
                - id: env-qa
                  org_id: org-1
                  name: qa
                  admin_url: http://qa-gateway:9180
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");
        assert_eq!(config.gateway.timeout_ms, 5000);

        let env = config.environments[0].clone().into_environment();
        assert_eq!(env.name, "qa");
        assert_eq!(env.admin_url, "http://qa-gateway:9180");
    }

    #[test]
    fn test_upstream_seed_derives_gateway_id() {
        let yaml = r#"
            gateway:
                admin_key: secret
            upstreams:
                - id: ups-1
                  org_id: org-1
                  environment_id: env-qa
                  name: orders-backend
                  spec:
                    type: roundrobin
                    nodes:
                        "10.0.0.1:8080": 1
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let upstream = config.upstreams[0].clone().into_upstream();
        assert_eq!(
            upstream.gateway_id,
            ids::generate(ResourceKind::Upstream, "env-qa/orders-backend", "orders-backend")
        );
        assert_eq!(upstream.spec.lb_type.as_deref(), Some("roundrobin"));
    }

    #[test]
    fn test_missing_admin_key_is_a_parse_error() {
        let tmp = write_tmp_file("gateway: {}\n");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
