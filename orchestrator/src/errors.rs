use gateway::client::GatewaySyncError;
use registry::store::StoreError;
use registry::types::RevisionState;

/// Result type alias for orchestration operations
pub type Result<T, E = OrchestrationError> = std::result::Result<T, E>;

/// Errors surfaced by the revision lifecycle. Variants carry enough
/// context (ids, states, blocking revision numbers) for a caller to
/// self-correct without inspecting control-plane internals.
#[derive(thiserror::Error, Debug)]
pub enum OrchestrationError {
    #[error("service not found with ID: {0}")]
    ServiceNotFound(String),

    #[error("service revision not found with ID: {0}")]
    RevisionNotFound(String),

    #[error("environment not found with ID: {0}")]
    EnvironmentNotFound(String),

    #[error("upstream not found with ID: {0}")]
    UpstreamNotFound(String),

    #[error("at least one route specification is required")]
    EmptyRoutes,

    #[error("upstream {upstream_id} does not belong to environment {environment_id}")]
    UpstreamEnvironmentMismatch {
        upstream_id: String,
        environment_id: String,
    },

    #[error("upstream not configured for environment: {environment_id}")]
    UpstreamNotConfigured { environment_id: String },

    #[error("either a target url or an upstream spec with nodes is required")]
    MissingUpstreamTarget,

    #[error(transparent)]
    InvalidTargetUrl(#[from] gateway::spec::TargetUrlError),

    #[error("revision {revision_number} is {state}; this operation requires an INACTIVE revision")]
    RevisionNotInactive {
        revision_number: u32,
        state: RevisionState,
    },

    #[error(
        "revision {revision_number} is already deployed to environment {environment_id}; use force to redeploy"
    )]
    AlreadyDeployed {
        revision_number: u32,
        environment_id: String,
    },

    #[error(
        "revision {blocking_revision} is already deployed to environment {environment_id}; undeploy it first or use force deploy"
    )]
    DeploymentConflict {
        blocking_revision: u32,
        environment_id: String,
    },

    #[error(
        "upstream binding for environment {environment_id} is frozen while revision {revision_number} is deployed there; undeploy first"
    )]
    BindingFrozen {
        revision_number: u32,
        environment_id: String,
    },

    #[error("gateway sync failed: {0}")]
    Gateway(#[from] GatewaySyncError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
