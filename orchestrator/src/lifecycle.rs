//! Revision lifecycle and the deploy/undeploy protocols.
//!
//! A revision cycles INACTIVE -> ACTIVE -> INACTIVE as deployments come and
//! go; the deployment ledger is the source of truth and the stored state is
//! a recomputed projection. Gateway writes sit outside the control-plane
//! commit: deploy pushes first and commits the ledger row only on success,
//! undeploy deletes gateway resources first and removes the row only after
//! they are confirmed gone (or already absent). Every gateway call is
//! idempotent, so a failed operation is recovered by retrying it whole.

use crate::config::GatewayConfig;
use crate::errors::{OrchestrationError, Result};
use crate::metrics_defs;
use gateway::client::AdminClient;
use gateway::ids::{self, ResourceKind};
use gateway::spec::{RouteSpec, ServiceSpec, UpstreamSpec};
use registry::registries::{EnvironmentRegistry, UpstreamRegistry};
use registry::store::{Store, StoreError};
use registry::types::{
    Deployment, Environment, Revision, RevisionState, ServiceRecord, Upstream, UpstreamBinding,
};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use uuid::Uuid;

/// Caller input for one revision: the service spec, its routes, and
/// optional per-environment upstream assignments.
#[derive(Clone, Debug, Default)]
pub struct NewRevision {
    pub service_spec: ServiceSpec,
    pub route_specs: Vec<RouteSpec>,
    pub environment_upstreams: Vec<EnvironmentUpstream>,
}

#[derive(Clone, Debug)]
pub struct EnvironmentUpstream {
    pub environment_id: String,
    pub upstream_id: String,
}

/// Caller input for registering an upstream in one environment. Either a
/// backend URL (expanded to a single weighted node) or a full spec with
/// nodes must be given.
#[derive(Clone, Debug, Default)]
pub struct NewUpstream {
    pub name: String,
    pub target_url: Option<String>,
    pub spec: Option<UpstreamSpec>,
}

pub struct RevisionLifecycle {
    store: Arc<Store>,
    environments: Arc<dyn EnvironmentRegistry>,
    upstreams: Arc<dyn UpstreamRegistry>,
    gateway: GatewayConfig,
}

impl RevisionLifecycle {
    pub fn new(
        store: Arc<Store>,
        environments: Arc<dyn EnvironmentRegistry>,
        upstreams: Arc<dyn UpstreamRegistry>,
        gateway: GatewayConfig,
    ) -> Self {
        RevisionLifecycle {
            store,
            environments,
            upstreams,
            gateway,
        }
    }

    // --- services ---

    pub fn register_service(
        &self,
        org_id: &str,
        name: &str,
        display_name: Option<String>,
    ) -> ServiceRecord {
        let service = ServiceRecord {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            name: name.to_string(),
            display_name,
        };
        self.store.insert_service(service.clone());
        service
    }

    // --- revisions ---

    /// Creates the next revision of a service. Routes are stamped with the
    /// owning service's id (they are not valid standalone); any provided
    /// environment-upstream mappings are validated and stored as bindings.
    pub async fn create_revision(&self, service_id: &str, request: NewRevision) -> Result<Revision> {
        let service = self.service_or_err(service_id)?;

        if request.route_specs.is_empty() {
            return Err(OrchestrationError::EmptyRoutes);
        }

        // Validate every mapping before writing anything.
        for mapping in &request.environment_upstreams {
            self.validate_mapping(&mapping.environment_id, &mapping.upstream_id)
                .await?;
        }

        let mut route_specs = request.route_specs;
        stamp_service_id(&mut route_specs, &service.id);

        let now = SystemTime::now();
        let revision = self.store.insert_revision(Revision {
            id: Uuid::new_v4().to_string(),
            org_id: service.org_id.clone(),
            service_id: service.id.clone(),
            revision_number: 0, // assigned by the store
            state: RevisionState::Inactive,
            service_spec: request.service_spec,
            route_specs,
            created_at: now,
            updated_at: now,
        })?;

        for mapping in request.environment_upstreams {
            self.store.upsert_binding(UpstreamBinding {
                org_id: service.org_id.clone(),
                service_id: service.id.clone(),
                revision_id: revision.id.clone(),
                environment_id: mapping.environment_id,
                upstream_id: mapping.upstream_id,
            });
        }

        tracing::info!(
            revision_id = %revision.id,
            revision_number = revision.revision_number,
            service = %service.name,
            "revision created"
        );
        Ok(revision)
    }

    /// Copies specs and upstream bindings (never deployments) into a new
    /// revision at the next number.
    pub async fn clone_revision(&self, revision_id: &str) -> Result<Revision> {
        let source = self.revision_or_err(revision_id)?;

        let now = SystemTime::now();
        let cloned = self.store.insert_revision(Revision {
            id: Uuid::new_v4().to_string(),
            org_id: source.org_id.clone(),
            service_id: source.service_id.clone(),
            revision_number: 0,
            state: RevisionState::Inactive,
            service_spec: source.service_spec.clone(),
            route_specs: source.route_specs.clone(),
            created_at: now,
            updated_at: now,
        })?;

        for binding in self.store.bindings_by_revision(&source.id) {
            self.store.upsert_binding(UpstreamBinding {
                revision_id: cloned.id.clone(),
                ..binding
            });
        }

        tracing::info!(
            revision_id = %cloned.id,
            revision_number = cloned.revision_number,
            source = %source.id,
            "revision cloned"
        );
        Ok(cloned)
    }

    pub fn update_revision_specs(
        &self,
        revision_id: &str,
        service_spec: ServiceSpec,
        route_specs: Vec<RouteSpec>,
    ) -> Result<Revision> {
        let revision = self.revision_or_err(revision_id)?;
        self.require_inactive(&revision)?;

        if route_specs.is_empty() {
            return Err(OrchestrationError::EmptyRoutes);
        }

        let mut route_specs = route_specs;
        stamp_service_id(&mut route_specs, &revision.service_id);

        let updated = self
            .store
            .update_revision_specs(revision_id, service_spec, route_specs)?;
        tracing::info!(revision_id = %revision_id, "revision specs updated");
        Ok(updated)
    }

    /// Deletes an inactive revision and cascades its bindings.
    pub fn delete_revision(&self, revision_id: &str) -> Result<()> {
        let revision = self.revision_or_err(revision_id)?;
        self.require_inactive(&revision)?;

        self.store.remove_revision(revision_id)?;
        tracing::info!(revision_id = %revision_id, "revision deleted");
        Ok(())
    }

    // --- upstream bindings ---

    /// Assigns an upstream to a (revision, environment) pair. Rejected
    /// while that exact pair has a live deployment; undeploy first.
    pub async fn bind_upstream(
        &self,
        revision_id: &str,
        environment_id: &str,
        upstream_id: &str,
    ) -> Result<UpstreamBinding> {
        let revision = self.revision_or_err(revision_id)?;
        self.validate_mapping(environment_id, upstream_id).await?;

        let deployed_here = self
            .store
            .deployment_for(&revision.service_id, environment_id)
            .is_some_and(|d| d.revision_id == revision.id);
        if deployed_here {
            return Err(OrchestrationError::BindingFrozen {
                revision_number: revision.revision_number,
                environment_id: environment_id.to_string(),
            });
        }

        let binding = UpstreamBinding {
            org_id: revision.org_id.clone(),
            service_id: revision.service_id.clone(),
            revision_id: revision.id.clone(),
            environment_id: environment_id.to_string(),
            upstream_id: upstream_id.to_string(),
        };
        self.store.upsert_binding(binding.clone());
        Ok(binding)
    }

    // --- upstreams ---

    /// Registers an environment-scoped upstream and pushes it to that
    /// environment's gateway under a deterministic id. The registry write
    /// happens after the gateway accepts it; retries overwrite in place.
    pub async fn register_upstream(
        &self,
        environment_id: &str,
        request: NewUpstream,
    ) -> Result<Upstream> {
        let environment = self.environment(environment_id).await?;

        let spec = match (request.spec, request.target_url) {
            (Some(mut spec), target_url) => {
                if spec.name.is_none() {
                    spec.name = Some(request.name.clone());
                }
                if spec.nodes.is_none() {
                    // A spec without nodes still needs a target; derive the
                    // node set from the URL and keep everything else the
                    // caller set (labels, retries, timeouts).
                    let target_url =
                        target_url.ok_or(OrchestrationError::MissingUpstreamTarget)?;
                    let derived = UpstreamSpec::from_target_url(&request.name, &target_url)?;
                    spec.nodes = derived.nodes;
                    if spec.scheme.is_none() {
                        spec.scheme = derived.scheme;
                    }
                    if spec.pass_host.is_none() {
                        spec.pass_host = derived.pass_host;
                    }
                    if spec.lb_type.is_none() {
                        spec.lb_type = derived.lb_type;
                    }
                }
                spec
            }
            (None, Some(target_url)) => UpstreamSpec::from_target_url(&request.name, &target_url)?,
            (None, None) => return Err(OrchestrationError::MissingUpstreamTarget),
        };

        let gateway_id = ids::generate(
            ResourceKind::Upstream,
            &format!("{}/{}", environment.id, request.name),
            &request.name,
        );

        let upstream = Upstream {
            id: Uuid::new_v4().to_string(),
            org_id: environment.org_id.clone(),
            environment_id: environment.id.clone(),
            name: request.name,
            spec,
            gateway_id,
        };

        let client = self.admin_client(&environment)?;
        client
            .upsert_upstream(&upstream.gateway_id, &upstream.spec.to_payload())
            .await?;
        self.upstreams.put(upstream.clone()).await;

        tracing::info!(
            upstream_id = %upstream.id,
            gateway_id = %upstream.gateway_id,
            environment = %environment.name,
            "upstream registered"
        );
        Ok(upstream)
    }

    // --- deploy / undeploy ---

    pub async fn deploy(
        &self,
        revision_id: &str,
        environment_id: &str,
        force: bool,
    ) -> Result<Revision> {
        let started = Instant::now();
        let result = self.deploy_inner(revision_id, environment_id, force).await;

        match &result {
            Ok(_) => metrics::counter!(metrics_defs::DEPLOYS.name).increment(1),
            Err(_) => metrics::counter!(metrics_defs::DEPLOY_FAILURES.name).increment(1),
        }
        metrics::histogram!(metrics_defs::DEPLOY_DURATION.name)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn deploy_inner(
        &self,
        revision_id: &str,
        environment_id: &str,
        force: bool,
    ) -> Result<Revision> {
        let revision = self.revision_or_err(revision_id)?;
        let service = self.service_or_err(&revision.service_id)?;
        let environment = self.environment(environment_id).await?;

        tracing::info!(
            revision_id = %revision.id,
            revision_number = revision.revision_number,
            service = %service.name,
            environment = %environment.name,
            force,
            "deploying revision"
        );

        // Bindings are a hard precondition; nothing is created implicitly
        // at deploy time.
        let binding = self.store.binding(&revision.id, environment_id).ok_or(
            OrchestrationError::UpstreamNotConfigured {
                environment_id: environment_id.to_string(),
            },
        )?;
        let upstream = self.upstream(&binding.upstream_id).await?;

        // Conflict detection against the ledger. With force, the blocking
        // revision goes through the full undeploy protocol first; if that
        // fails the deploy aborts before touching the new revision.
        let mut already_live = false;
        if let Some(existing) = self
            .store
            .deployment_for(&revision.service_id, environment_id)
        {
            if existing.revision_id == revision.id {
                if !force {
                    return Err(OrchestrationError::AlreadyDeployed {
                        revision_number: revision.revision_number,
                        environment_id: environment_id.to_string(),
                    });
                }
                // Redeploying the live revision overwrites in place; the
                // ledger row is already correct.
                already_live = true;
            } else if !force {
                return Err(self.conflict_for(&existing.revision_id, environment_id));
            } else {
                let blocking = self.revision_or_err(&existing.revision_id)?;
                tracing::info!(
                    blocking_revision = blocking.revision_number,
                    environment = %environment.name,
                    "force deploy: auto-undeploying live revision"
                );
                self.remove_from_gateway(&blocking, &service, &environment)
                    .await?;
                self.store
                    .commit_undeploy(&service.id, environment_id, &blocking.id);
            }
        }

        let client = self.admin_client(&environment)?;
        self.push_to_gateway(&client, &revision, &service, &upstream)
            .await?;

        if !already_live {
            let committed = self.store.commit_deploy(Deployment {
                id: Uuid::new_v4().to_string(),
                org_id: revision.org_id.clone(),
                service_id: revision.service_id.clone(),
                revision_id: revision.id.clone(),
                environment_id: environment_id.to_string(),
                deployed_at: SystemTime::now(),
            });

            if let Err(err) = committed {
                // Lost a race on the ledger slot; the gateway now reflects
                // the winner's eventual state because pushes are idempotent
                // per resource id, and our row was never written.
                return Err(match err {
                    StoreError::DuplicateDeployment {
                        existing_revision_id,
                        ..
                    } if existing_revision_id == revision.id => {
                        OrchestrationError::AlreadyDeployed {
                            revision_number: revision.revision_number,
                            environment_id: environment_id.to_string(),
                        }
                    }
                    StoreError::DuplicateDeployment {
                        existing_revision_id,
                        ..
                    } => self.conflict_for(&existing_revision_id, environment_id),
                    other => other.into(),
                });
            }
        }

        let deployed = self.revision_or_err(revision_id)?;
        tracing::info!(
            revision_number = deployed.revision_number,
            state = %deployed.state,
            "deployment complete"
        );
        Ok(deployed)
    }

    /// Removes a revision from an environment. When no ledger row matches
    /// this exact revision the call is an idempotent no-op, so retries and
    /// crash recovery are safe.
    pub async fn undeploy(&self, revision_id: &str, environment_id: &str) -> Result<Revision> {
        let revision = self.revision_or_err(revision_id)?;
        let service = self.service_or_err(&revision.service_id)?;
        let environment = self.environment(environment_id).await?;

        let matches = self
            .store
            .deployment_for(&revision.service_id, environment_id)
            .is_some_and(|d| d.revision_id == revision.id);

        if matches {
            self.remove_from_gateway(&revision, &service, &environment)
                .await?;
            self.store
                .commit_undeploy(&revision.service_id, environment_id, &revision.id);
            metrics::counter!(metrics_defs::UNDEPLOYS.name).increment(1);
        } else {
            tracing::warn!(
                revision_number = revision.revision_number,
                environment = %environment.name,
                "revision not deployed here, skipping"
            );
        }

        let current = self.revision_or_err(revision_id)?;
        tracing::info!(
            revision_number = current.revision_number,
            state = %current.state,
            "undeployment complete"
        );
        Ok(current)
    }

    // --- read accessors ---

    pub fn revision(&self, revision_id: &str) -> Result<Revision> {
        self.revision_or_err(revision_id)
    }

    pub fn revisions_by_service(&self, service_id: &str) -> Vec<Revision> {
        self.store.revisions_by_service(service_id)
    }

    pub fn deployment_for(&self, service_id: &str, environment_id: &str) -> Option<Deployment> {
        self.store.deployment_for(service_id, environment_id)
    }

    pub fn deployments_by_revision(&self, revision_id: &str) -> Vec<Deployment> {
        self.store.deployments_by_revision(revision_id)
    }

    pub fn binding(&self, revision_id: &str, environment_id: &str) -> Option<UpstreamBinding> {
        self.store.binding(revision_id, environment_id)
    }

    pub fn bindings_by_revision(&self, revision_id: &str) -> Vec<UpstreamBinding> {
        self.store.bindings_by_revision(revision_id)
    }

    // --- internals ---

    /// Service upsert first, then routes in list order; routes reference
    /// the service, so the gateway must see it before them.
    async fn push_to_gateway(
        &self,
        client: &AdminClient,
        revision: &Revision,
        service: &ServiceRecord,
        upstream: &Upstream,
    ) -> Result<()> {
        let gateway_service_id = gateway_service_id(service);
        let fallback_desc = format!("{} - Revision {}", service.name, revision.revision_number);
        let payload = revision
            .service_spec
            .to_payload(&upstream.gateway_id, &fallback_desc);
        client.upsert_service(&gateway_service_id, &payload).await?;

        for (index, route) in revision.route_specs.iter().enumerate() {
            // On the wire the back-reference must resolve inside the
            // gateway, so the stored control-plane service id is swapped
            // for the gateway-side one.
            let mut route = route.clone();
            route.service_id = Some(gateway_service_id.clone());
            client
                .upsert_route(&gateway_route_id(service, &route, index), &route.to_payload())
                .await?;
        }

        tracing::info!(
            routes = revision.route_specs.len(),
            gateway_service_id = %gateway_service_id,
            "pushed revision to gateway"
        );
        Ok(())
    }

    /// Routes first, in list order, then the service they reference. The
    /// settle delay lets the gateway observe the deletions before the
    /// service disappears from under them.
    async fn remove_from_gateway(
        &self,
        revision: &Revision,
        service: &ServiceRecord,
        environment: &Environment,
    ) -> Result<()> {
        let binding = self.store.binding(&revision.id, &environment.id).ok_or(
            OrchestrationError::UpstreamNotConfigured {
                environment_id: environment.id.clone(),
            },
        )?;
        let upstream = self.upstream(&binding.upstream_id).await?;
        tracing::info!(
            revision_number = revision.revision_number,
            upstream = %upstream.gateway_id,
            environment = %environment.name,
            "removing revision from gateway"
        );

        let client = self.admin_client(environment)?;
        for (index, route) in revision.route_specs.iter().enumerate() {
            client
                .delete_route(&gateway_route_id(service, route, index))
                .await?;
        }

        let settle = self.gateway.settle_delay();
        if !revision.route_specs.is_empty() && !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        client.delete_service(&gateway_service_id(service)).await?;
        Ok(())
    }

    async fn validate_mapping(
        &self,
        environment_id: &str,
        upstream_id: &str,
    ) -> Result<(Environment, Upstream)> {
        let environment = self.environment(environment_id).await?;
        let upstream = self.upstream(upstream_id).await?;
        if upstream.environment_id != environment_id {
            return Err(OrchestrationError::UpstreamEnvironmentMismatch {
                upstream_id: upstream_id.to_string(),
                environment_id: environment_id.to_string(),
            });
        }
        Ok((environment, upstream))
    }

    fn conflict_for(&self, blocking_revision_id: &str, environment_id: &str) -> OrchestrationError {
        match self.store.revision(blocking_revision_id) {
            Some(blocking) => OrchestrationError::DeploymentConflict {
                blocking_revision: blocking.revision_number,
                environment_id: environment_id.to_string(),
            },
            // A ledger row pointing at a revision the store no longer has;
            // report the dangling id rather than inventing a number.
            None => OrchestrationError::RevisionNotFound(blocking_revision_id.to_string()),
        }
    }

    fn require_inactive(&self, revision: &Revision) -> Result<()> {
        if revision.state != RevisionState::Inactive {
            return Err(OrchestrationError::RevisionNotInactive {
                revision_number: revision.revision_number,
                state: revision.state,
            });
        }
        Ok(())
    }

    fn admin_client(&self, environment: &Environment) -> Result<AdminClient> {
        Ok(AdminClient::new(
            &environment.admin_url,
            &self.gateway.admin_key,
            self.gateway.timeout(),
        )?)
    }

    fn revision_or_err(&self, revision_id: &str) -> Result<Revision> {
        self.store
            .revision(revision_id)
            .ok_or_else(|| OrchestrationError::RevisionNotFound(revision_id.to_string()))
    }

    fn service_or_err(&self, service_id: &str) -> Result<ServiceRecord> {
        self.store
            .service(service_id)
            .ok_or_else(|| OrchestrationError::ServiceNotFound(service_id.to_string()))
    }

    async fn environment(&self, environment_id: &str) -> Result<Environment> {
        self.environments
            .get(environment_id)
            .await
            .ok_or_else(|| OrchestrationError::EnvironmentNotFound(environment_id.to_string()))
    }

    async fn upstream(&self, upstream_id: &str) -> Result<Upstream> {
        self.upstreams
            .get(upstream_id)
            .await
            .ok_or_else(|| OrchestrationError::UpstreamNotFound(upstream_id.to_string()))
    }
}

fn gateway_service_id(service: &ServiceRecord) -> String {
    ids::generate(ResourceKind::Service, &service.id, &service.name)
}

fn gateway_route_id(service: &ServiceRecord, route: &RouteSpec, index: usize) -> String {
    let route_name = route
        .name
        .clone()
        .unwrap_or_else(|| format!("route-{index}"));
    ids::generate(
        ResourceKind::Route,
        &format!("{}/{}/{}", service.id, route_name, index),
        &route_name,
    )
}

fn stamp_service_id(routes: &mut [RouteSpec], service_id: &str) {
    for route in routes {
        route.service_id = Some(service_id.to_string());
    }
}
