//! Role/permission registry clients.
//!
//! The registry is the backend that owns the permission catalogue, the
//! roles, and each principal's granted set. [`RegistryClient`] is the only
//! seam the rest of the crate talks to it through.

mod http;
mod memory;

pub use http::HttpRegistryClient;
pub use memory::{InMemoryRegistry, InjectedFailure};

use crate::Result;
use crate::models::{
    Action, GrantedPermissionSet, NewRole, Permission, PermissionId, Resource, Role, RoleId,
    RoleUpdate,
};
use serde::Deserialize;

/// Client for the role/permission registry.
///
/// Implementations must report an expired or invalid session as
/// [`crate::Error::Unauthorized`] so the permission session can tear
/// itself down.
pub trait RegistryClient: Send + Sync {
    /// Fetches the signed-in principal's granted permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the session is unauthorized.
    fn fetch_granted_permissions(&self) -> Result<GrantedPermissionSet>;

    /// Lists the permission catalogue, optionally filtered.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn list_permissions(&self, filter: &PermissionFilter) -> Result<Vec<Permission>>;

    /// Lists roles, optionally restricted to one company scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn list_roles(&self, company_id: Option<&str>) -> Result<Vec<Role>>;

    /// Creates a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry rejects the role.
    fn create_role(&self, role: &NewRole) -> Result<Role>;

    /// Updates a role's details.
    ///
    /// # Errors
    ///
    /// Returns an error if the role does not exist or the update is rejected.
    fn update_role(&self, id: &RoleId, update: &RoleUpdate) -> Result<Role>;

    /// Replaces a role's permission set with exactly `permission_ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the role does not exist or the set is rejected.
    fn assign_permissions(&self, id: &RoleId, permission_ids: &[PermissionId]) -> Result<Role>;

    /// Deletes a role. The registry decides whether deletion is allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the role does not exist or is still in use.
    fn delete_role(&self, id: &RoleId) -> Result<()>;
}

/// Narrows a permission catalogue listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionFilter {
    /// Only permissions on this resource.
    pub resource: Option<Resource>,
    /// Only permissions with this action.
    pub action: Option<Action>,
}

impl PermissionFilter {
    /// Matches every permission.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            resource: None,
            action: None,
        }
    }

    /// Matches permissions on `resource`.
    #[must_use]
    pub const fn by_resource(resource: Resource) -> Self {
        Self {
            resource: Some(resource),
            action: None,
        }
    }

    /// Matches permissions with `action`.
    #[must_use]
    pub const fn by_action(action: Action) -> Self {
        Self {
            resource: None,
            action: Some(action),
        }
    }

    /// Returns true if `permission` passes the filter.
    #[must_use]
    pub fn matches(&self, permission: &Permission) -> bool {
        self.resource.is_none_or(|r| r == permission.resource)
            && self.action.is_none_or(|a| a == permission.action)
    }
}

/// A response body that is either bare or wrapped as `{"data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}
