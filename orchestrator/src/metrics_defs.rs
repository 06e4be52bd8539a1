//! Metric definitions for orchestration operations.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const DEPLOYS: MetricDef = MetricDef {
    name: "orchestrator.deploys",
    metric_type: MetricType::Counter,
    description: "Successful revision deploys, including force deploys",
};

pub const DEPLOY_FAILURES: MetricDef = MetricDef {
    name: "orchestrator.deploy_failures",
    metric_type: MetricType::Counter,
    description: "Deploys aborted by validation, conflicts or gateway errors",
};

pub const UNDEPLOYS: MetricDef = MetricDef {
    name: "orchestrator.undeploys",
    metric_type: MetricType::Counter,
    description: "Successful undeploys; idempotent no-ops are not counted",
};

pub const DEPLOY_DURATION: MetricDef = MetricDef {
    name: "orchestrator.deploy.duration",
    metric_type: MetricType::Histogram,
    description: "Deploy duration in seconds, gateway round-trips included",
};

pub const ALL_METRICS: &[MetricDef] = &[DEPLOYS, DEPLOY_FAILURES, UNDEPLOYS, DEPLOY_DURATION];
