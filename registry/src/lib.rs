pub mod registries;
pub mod store;
pub mod types;
