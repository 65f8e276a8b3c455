pub mod cache;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod metrics_consts;
pub mod metrics_utils;
pub mod models;
pub mod router;
pub mod server;
pub mod store;
pub mod translation;

// Used by the integration tests under tests/ as well
pub mod test_utils;
