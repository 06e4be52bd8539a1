//! Control-plane store: revisions, the deployment ledger and upstream
//! bindings behind one lock.
//!
//! The ledger and binding maps are keyed by (service, environment) and
//! (revision, environment) respectively, so their uniqueness invariants
//! hold by construction rather than by application-level checks. The
//! `commit_*` operations mutate several tables under a single write guard;
//! they are the all-or-nothing boundary for control-plane writes, and
//! `commit_deploy` is the serialization point for racing deploys.

use crate::types::{
    Deployment, EnvironmentId, Revision, RevisionId, RevisionState, ServiceId, ServiceRecord,
    UpstreamBinding,
};
use gateway::spec::{RouteSpec, ServiceSpec};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::SystemTime;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("service not found with ID: {0}")]
    ServiceNotFound(ServiceId),

    #[error("service revision not found with ID: {0}")]
    RevisionNotFound(RevisionId),

    #[error("a deployment already exists for service {service_id} in environment {environment_id}")]
    DuplicateDeployment {
        service_id: ServiceId,
        environment_id: EnvironmentId,
        /// The revision currently holding the slot, so callers can name it.
        existing_revision_id: RevisionId,
    },
}

#[derive(Default)]
struct Tables {
    services: HashMap<ServiceId, ServiceRecord>,
    revisions: HashMap<RevisionId, Revision>,
    deployments: HashMap<(ServiceId, EnvironmentId), Deployment>,
    bindings: HashMap<(RevisionId, EnvironmentId), UpstreamBinding>,
}

impl Tables {
    fn recompute_state(&mut self, revision_id: &str) {
        let active = self
            .deployments
            .values()
            .any(|d| d.revision_id == revision_id);
        if let Some(revision) = self.revisions.get_mut(revision_id) {
            revision.state = if active {
                RevisionState::Active
            } else {
                RevisionState::Inactive
            };
        }
    }
}

#[derive(Default)]
pub struct Store {
    inner: RwLock<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    // --- services ---

    pub fn insert_service(&self, service: ServiceRecord) {
        self.inner.write().services.insert(service.id.clone(), service);
    }

    pub fn service(&self, id: &str) -> Option<ServiceRecord> {
        self.inner.read().services.get(id).cloned()
    }

    // --- revisions ---

    /// Assigns the next revision number for the service and inserts, both
    /// under one write guard so concurrent creates cannot collide. Numbers
    /// start at 1 and derive from the current maximum, so deleting
    /// intermediate revisions never causes reuse.
    pub fn insert_revision(&self, mut revision: Revision) -> Result<Revision, StoreError> {
        let mut tables = self.inner.write();
        if !tables.services.contains_key(&revision.service_id) {
            return Err(StoreError::ServiceNotFound(revision.service_id));
        }

        let next = tables
            .revisions
            .values()
            .filter(|r| r.service_id == revision.service_id)
            .map(|r| r.revision_number)
            .max()
            .map_or(1, |n| n + 1);

        revision.revision_number = next;
        tables.revisions.insert(revision.id.clone(), revision.clone());
        Ok(revision)
    }

    pub fn revision(&self, id: &str) -> Option<Revision> {
        self.inner.read().revisions.get(id).cloned()
    }

    /// Revisions of a service, newest first.
    pub fn revisions_by_service(&self, service_id: &str) -> Vec<Revision> {
        let tables = self.inner.read();
        let mut revisions: Vec<Revision> = tables
            .revisions
            .values()
            .filter(|r| r.service_id == service_id)
            .cloned()
            .collect();
        revisions.sort_by(|a, b| b.revision_number.cmp(&a.revision_number));
        revisions
    }

    pub fn update_revision_specs(
        &self,
        id: &str,
        service_spec: ServiceSpec,
        route_specs: Vec<RouteSpec>,
    ) -> Result<Revision, StoreError> {
        let mut tables = self.inner.write();
        let revision = tables
            .revisions
            .get_mut(id)
            .ok_or_else(|| StoreError::RevisionNotFound(id.to_string()))?;

        revision.service_spec = service_spec;
        revision.route_specs = route_specs;
        revision.updated_at = SystemTime::now();
        Ok(revision.clone())
    }

    /// Removes a revision and cascades its bindings.
    pub fn remove_revision(&self, id: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.write();
        if tables.revisions.remove(id).is_none() {
            return Err(StoreError::RevisionNotFound(id.to_string()));
        }
        tables.bindings.retain(|(revision_id, _), _| revision_id != id);
        Ok(())
    }

    // --- upstream bindings ---

    pub fn upsert_binding(&self, binding: UpstreamBinding) {
        self.inner.write().bindings.insert(
            (binding.revision_id.clone(), binding.environment_id.clone()),
            binding,
        );
    }

    pub fn binding(&self, revision_id: &str, environment_id: &str) -> Option<UpstreamBinding> {
        self.inner
            .read()
            .bindings
            .get(&(revision_id.to_string(), environment_id.to_string()))
            .cloned()
    }

    pub fn bindings_by_revision(&self, revision_id: &str) -> Vec<UpstreamBinding> {
        self.inner
            .read()
            .bindings
            .values()
            .filter(|b| b.revision_id == revision_id)
            .cloned()
            .collect()
    }

    // --- deployment ledger ---

    pub fn deployment_for(&self, service_id: &str, environment_id: &str) -> Option<Deployment> {
        self.inner
            .read()
            .deployments
            .get(&(service_id.to_string(), environment_id.to_string()))
            .cloned()
    }

    pub fn deployments_by_revision(&self, revision_id: &str) -> Vec<Deployment> {
        self.inner
            .read()
            .deployments
            .values()
            .filter(|d| d.revision_id == revision_id)
            .cloned()
            .collect()
    }

    /// Writes the ledger row and flips the revision state in one atomic
    /// step. A second deploy racing on the same (service, environment)
    /// slot loses here with `DuplicateDeployment`.
    pub fn commit_deploy(&self, deployment: Deployment) -> Result<(), StoreError> {
        let mut tables = self.inner.write();
        let key = (
            deployment.service_id.clone(),
            deployment.environment_id.clone(),
        );
        if let Some(existing) = tables.deployments.get(&key) {
            return Err(StoreError::DuplicateDeployment {
                service_id: deployment.service_id,
                environment_id: deployment.environment_id,
                existing_revision_id: existing.revision_id.clone(),
            });
        }

        let revision_id = deployment.revision_id.clone();
        tables.deployments.insert(key, deployment);
        tables.recompute_state(&revision_id);
        Ok(())
    }

    /// Removes the ledger row if it references exactly this revision and
    /// recomputes the revision's state from the remaining rows. Returns
    /// whether a row was removed; a mismatch or missing row is a no-op.
    pub fn commit_undeploy(
        &self,
        service_id: &str,
        environment_id: &str,
        revision_id: &str,
    ) -> bool {
        let mut tables = self.inner.write();
        let key = (service_id.to_string(), environment_id.to_string());

        let removed = match tables.deployments.get(&key) {
            Some(deployment) if deployment.revision_id == revision_id => {
                tables.deployments.remove(&key);
                true
            }
            _ => false,
        };

        tables.recompute_state(revision_id);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway::spec::ServiceSpec;

    fn service(id: &str) -> ServiceRecord {
        ServiceRecord {
            id: id.into(),
            org_id: "org-1".into(),
            name: format!("svc-{id}"),
            display_name: None,
        }
    }

    fn revision(id: &str, service_id: &str) -> Revision {
        Revision {
            id: id.into(),
            org_id: "org-1".into(),
            service_id: service_id.into(),
            revision_number: 0,
            state: RevisionState::Inactive,
            service_spec: ServiceSpec::default(),
            route_specs: vec![RouteSpec::default()],
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        }
    }

    fn deployment(service_id: &str, revision_id: &str, environment_id: &str) -> Deployment {
        Deployment {
            id: format!("dep-{revision_id}-{environment_id}"),
            org_id: "org-1".into(),
            service_id: service_id.into(),
            revision_id: revision_id.into(),
            environment_id: environment_id.into(),
            deployed_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_revision_numbers_increase_and_skip_deleted_intermediates() {
        let store = Store::new();
        store.insert_service(service("s1"));

        let r1 = store.insert_revision(revision("r1", "s1")).unwrap();
        let r2 = store.insert_revision(revision("r2", "s1")).unwrap();
        let r3 = store.insert_revision(revision("r3", "s1")).unwrap();
        assert_eq!((r1.revision_number, r2.revision_number, r3.revision_number), (1, 2, 3));

        // Deleting an intermediate revision must not release its number.
        store.remove_revision("r2").unwrap();
        let r4 = store.insert_revision(revision("r4", "s1")).unwrap();
        assert_eq!(r4.revision_number, 4);
    }

    #[test]
    fn test_numbering_is_per_service() {
        let store = Store::new();
        store.insert_service(service("s1"));
        store.insert_service(service("s2"));

        store.insert_revision(revision("r1", "s1")).unwrap();
        let other = store.insert_revision(revision("r2", "s2")).unwrap();
        assert_eq!(other.revision_number, 1);
    }

    #[test]
    fn test_insert_revision_requires_service() {
        let store = Store::new();
        assert_eq!(
            store.insert_revision(revision("r1", "ghost")),
            Err(StoreError::ServiceNotFound("ghost".into()))
        );
    }

    #[test]
    fn test_ledger_rejects_second_deployment_for_slot() {
        let store = Store::new();
        store.insert_service(service("s1"));
        store.insert_revision(revision("r1", "s1")).unwrap();
        store.insert_revision(revision("r2", "s1")).unwrap();

        store.commit_deploy(deployment("s1", "r1", "env-a")).unwrap();
        let err = store
            .commit_deploy(deployment("s1", "r2", "env-a"))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDeployment { .. }));

        // A different environment is a different slot.
        store.commit_deploy(deployment("s1", "r2", "env-b")).unwrap();
    }

    #[test]
    fn test_state_tracks_ledger() {
        let store = Store::new();
        store.insert_service(service("s1"));
        store.insert_revision(revision("r1", "s1")).unwrap();

        assert_eq!(store.revision("r1").unwrap().state, RevisionState::Inactive);

        store.commit_deploy(deployment("s1", "r1", "env-a")).unwrap();
        store.commit_deploy(deployment("s1", "r1", "env-b")).unwrap();
        assert_eq!(store.revision("r1").unwrap().state, RevisionState::Active);

        // Still live in env-b after leaving env-a.
        assert!(store.commit_undeploy("s1", "env-a", "r1"));
        assert_eq!(store.revision("r1").unwrap().state, RevisionState::Active);

        assert!(store.commit_undeploy("s1", "env-b", "r1"));
        assert_eq!(store.revision("r1").unwrap().state, RevisionState::Inactive);
    }

    #[test]
    fn test_commit_undeploy_requires_exact_revision() {
        let store = Store::new();
        store.insert_service(service("s1"));
        store.insert_revision(revision("r1", "s1")).unwrap();
        store.commit_deploy(deployment("s1", "r1", "env-a")).unwrap();

        // Another revision's undeploy must not remove r1's row.
        assert!(!store.commit_undeploy("s1", "env-a", "r2"));
        assert!(store.deployment_for("s1", "env-a").is_some());
        assert_eq!(store.revision("r1").unwrap().state, RevisionState::Active);
    }

    #[test]
    fn test_binding_upsert_replaces() {
        let store = Store::new();
        let binding = UpstreamBinding {
            org_id: "org-1".into(),
            service_id: "s1".into(),
            revision_id: "r1".into(),
            environment_id: "env-a".into(),
            upstream_id: "u1".into(),
        };
        store.upsert_binding(binding.clone());
        store.upsert_binding(UpstreamBinding {
            upstream_id: "u2".into(),
            ..binding
        });

        let stored = store.binding("r1", "env-a").unwrap();
        assert_eq!(stored.upstream_id, "u2");
        assert_eq!(store.bindings_by_revision("r1").len(), 1);
    }

    #[test]
    fn test_remove_revision_cascades_bindings() {
        let store = Store::new();
        store.insert_service(service("s1"));
        store.insert_revision(revision("r1", "s1")).unwrap();
        store.upsert_binding(UpstreamBinding {
            org_id: "org-1".into(),
            service_id: "s1".into(),
            revision_id: "r1".into(),
            environment_id: "env-a".into(),
            upstream_id: "u1".into(),
        });

        store.remove_revision("r1").unwrap();
        assert!(store.binding("r1", "env-a").is_none());
    }
}
