//! object-gateway - A single object-storage endpoint in front of many independent backends
//!
//! This crate provides GET/PUT by object id while spreading objects across a
//! dynamically discovered set of S3-compatible backends:
//! - Backend discovery (static list, JSON manifest, DNS) on a fixed interval
//! - An atomically replaced registry snapshot of initialized backend clients
//! - FNV-1a routing from object id to exactly one backend
//! - REST API that streams object bodies to and from the routed backend

pub mod api;
pub mod config;
pub mod discovery;
pub mod gateway;
pub mod object_store;
pub mod registry;
pub mod router;
#[cfg(test)]
pub mod testutil;

use config::Config;
use gateway::Gateway;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub gateway: Gateway,
}
