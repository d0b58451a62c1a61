//! I/O seams consumed by the broker and the version guard.
//!
//! Concrete implementations live in `libre-broker` (reqwest, files) and in
//! `libre-test-utils` (scripted mocks).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StateError, TransportError};

/// Outbound HTTP GET returning a JSON body.
///
/// # Contract
///
/// - `Ok(Some(value))`: 2xx response with a JSON body
/// - `Ok(None)`: any non-2xx response
/// - `Err(_)`: network failure or a body that is not JSON
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Option<Value>, TransportError>;
}

/// Source of the upstream content version identifier.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Latest upstream version.
    async fn latest_version(&self) -> Result<String, TransportError>;
}

/// Small persisted string map that survives restarts.
///
/// Holds the version stamp and anything else the application persists;
/// `clear` wipes all of it.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StateError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StateError>;

    /// Remove every persisted value.
    fn clear(&self) -> Result<(), StateError>;
}
