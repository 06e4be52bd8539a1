pub mod client;
pub mod ids;
pub mod spec;
pub mod testutils;
