//! Lookups the orchestration engine consumes but does not own.
//!
//! Environment and upstream management live elsewhere in the control
//! plane; the engine only needs resolution by id. The in-memory
//! implementations back tests and single-process deployments.

use crate::types::{Environment, Upstream};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[async_trait]
pub trait EnvironmentRegistry: Send + Sync {
    async fn get(&self, id: &str) -> Option<Environment>;
}

#[async_trait]
pub trait UpstreamRegistry: Send + Sync {
    async fn get(&self, id: &str) -> Option<Upstream>;
    async fn put(&self, upstream: Upstream);
}

#[derive(Default)]
pub struct InMemoryEnvironments {
    inner: RwLock<HashMap<String, Environment>>,
}

impl InMemoryEnvironments {
    pub fn new() -> Self {
        InMemoryEnvironments::default()
    }

    pub fn insert(&self, environment: Environment) {
        self.inner.write().insert(environment.id.clone(), environment);
    }
}

#[async_trait]
impl EnvironmentRegistry for InMemoryEnvironments {
    async fn get(&self, id: &str) -> Option<Environment> {
        self.inner.read().get(id).cloned()
    }
}

#[derive(Default)]
pub struct InMemoryUpstreams {
    inner: RwLock<HashMap<String, Upstream>>,
}

impl InMemoryUpstreams {
    pub fn new() -> Self {
        InMemoryUpstreams::default()
    }

    pub fn insert(&self, upstream: Upstream) {
        self.inner.write().insert(upstream.id.clone(), upstream);
    }
}

#[async_trait]
impl UpstreamRegistry for InMemoryUpstreams {
    async fn get(&self, id: &str) -> Option<Upstream> {
        self.inner.read().get(id).cloned()
    }

    async fn put(&self, upstream: Upstream) {
        self.insert(upstream);
    }
}
