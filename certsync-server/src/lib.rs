//! Certificate lifecycle engine for a reverse proxy

pub mod config;
pub mod store;
pub mod tls;

pub use config::SyncConfig;
