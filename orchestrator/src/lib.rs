pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod metrics_defs;
