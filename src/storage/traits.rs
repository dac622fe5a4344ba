//! Grant store trait.

use crate::Result;
use crate::models::GrantedPermissionSet;

/// Durable storage for a session's granted permissions.
///
/// Stores survive process restarts so a returning session can decide
/// access before the first registry round-trip completes. Keys are
/// logical names such as `user_permissions`, never paths.
pub trait GrantStore: Send + Sync {
    /// Loads the grants stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value cannot be read or decoded.
    fn load(&self, key: &str) -> Result<Option<GrantedPermissionSet>>;

    /// Replaces the grants stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn save(&self, key: &str, grants: &GrantedPermissionSet) -> Result<()>;

    /// Removes the value stored under `key`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but cannot be removed.
    fn remove(&self, key: &str) -> Result<bool>;
}
