//! Control-plane entities.
//!
//! Bindings and deployments reference revisions, services and environments
//! by id only, so the ledger can be queried without loading specifications.

use gateway::spec::{RouteSpec, ServiceSpec, UpstreamSpec};
use std::time::SystemTime;

pub type OrgId = String;
pub type ServiceId = String;
pub type RevisionId = String;
pub type EnvironmentId = String;
pub type UpstreamId = String;

/// An API service identity; revisions are versioned configurations of it.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub org_id: OrgId,
    /// Immutable, unique within the organization.
    pub name: String,
    pub display_name: Option<String>,
}

/// Cached projection of the deployment ledger: Active iff at least one
/// deployment references the revision. The ledger is the source of truth;
/// the store recomputes this on every ledger mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevisionState {
    Inactive,
    Active,
}

impl std::fmt::Display for RevisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevisionState::Inactive => write!(f, "INACTIVE"),
            RevisionState::Active => write!(f, "ACTIVE"),
        }
    }
}

/// A numbered snapshot of a service's gateway configuration.
/// Specifications are mutable only while the revision is inactive.
#[derive(Clone, Debug, PartialEq)]
pub struct Revision {
    pub id: RevisionId,
    pub org_id: OrgId,
    pub service_id: ServiceId,
    /// 1-based, strictly increasing per service.
    pub revision_number: u32,
    pub state: RevisionState,
    pub service_spec: ServiceSpec,
    pub route_specs: Vec<RouteSpec>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Which upstream a revision uses in one environment. At most one binding
/// per (revision, environment); frozen while a matching deployment exists.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamBinding {
    pub org_id: OrgId,
    pub service_id: ServiceId,
    pub revision_id: RevisionId,
    pub environment_id: EnvironmentId,
    pub upstream_id: UpstreamId,
}

/// A revision currently live in an environment. Only live deployments
/// exist; undeploy removes the row. At most one per (service, environment).
#[derive(Clone, Debug)]
pub struct Deployment {
    pub id: String,
    pub org_id: OrgId,
    pub service_id: ServiceId,
    pub revision_id: RevisionId,
    pub environment_id: EnvironmentId,
    pub deployed_at: SystemTime,
}

/// A deployment target with its own gateway admin endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    pub id: EnvironmentId,
    pub org_id: OrgId,
    pub name: String,
    pub admin_url: String,
}

/// An environment-scoped backend target. `gateway_id` is the deterministic
/// id the upstream was pushed under.
#[derive(Clone, Debug, PartialEq)]
pub struct Upstream {
    pub id: UpstreamId,
    pub org_id: OrgId,
    pub environment_id: EnvironmentId,
    pub name: String,
    pub spec: UpstreamSpec,
    pub gateway_id: String,
}
