//! Business logic services.
//!
//! The permission session, the registry clients it fetches through, and
//! the role administration screen built on both.

mod registry;
mod role_admin;
mod session;

pub use registry::{
    HttpRegistryClient, InMemoryRegistry, InjectedFailure, PermissionFilter, RegistryClient,
};
pub use role_admin::{EditorState, PermissionGroup, RoleAdministration, RoleDraft};
pub use session::{DEFAULT_GRANTS_KEY, PermissionSession, PermissionSnapshot, RefreshOutcome};

use crate::Result;
use crate::config::ConsoleConfig;
use crate::storage::FilesystemGrantStore;
use std::sync::Arc;

/// Builds a session against the configured registry and data directory.
///
/// # Errors
///
/// Returns an error if the data directory cannot be created.
pub fn session_from_config(config: &ConsoleConfig) -> Result<PermissionSession> {
    let registry = Arc::new(HttpRegistryClient::from_config(&config.api));
    let store = Arc::new(FilesystemGrantStore::new(&config.storage.data_dir)?);
    tracing::debug!(
        base_url = %config.api.base_url,
        data_dir = %config.storage.data_dir.display(),
        "Building permission session"
    );
    Ok(PermissionSession::new(registry, store).with_storage_key(&config.storage.grants_key))
}
