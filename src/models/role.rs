//! Role records and their permission references.
//!
//! The registry transmits a role's permissions either fully populated or as
//! bare identifiers. Both shapes deserialize into [`PermissionRef`] once, at
//! the boundary, so nothing downstream has to inspect raw JSON.

use super::permission::{Permission, PermissionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Name of the role that may never be deleted.
pub const RESERVED_ADMIN_ROLE: &str = "admin";

/// Registry-side role identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    /// Creates a role ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A role's reference to one permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRef {
    /// The full permission record.
    Populated(Permission),
    /// Only the identifier.
    Reference(PermissionId),
}

impl PermissionRef {
    /// Returns the referenced identifier regardless of shape.
    #[must_use]
    pub const fn id(&self) -> &PermissionId {
        match self {
            Self::Populated(p) => &p.id,
            Self::Reference(id) => id,
        }
    }

    /// Returns the record if populated.
    #[must_use]
    pub const fn as_populated(&self) -> Option<&Permission> {
        match self {
            Self::Populated(p) => Some(p),
            Self::Reference(_) => None,
        }
    }
}

impl From<Permission> for PermissionRef {
    fn from(p: Permission) -> Self {
        Self::Populated(p)
    }
}

impl From<PermissionId> for PermissionRef {
    fn from(id: PermissionId) -> Self {
        Self::Reference(id)
    }
}

/// A named, reusable bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Registry identifier.
    #[serde(rename = "_id", alias = "id")]
    pub id: RoleId,
    /// Role name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Assigned permissions, in registry order.
    #[serde(default)]
    pub permissions: Vec<PermissionRef>,
    /// Whether the role can currently be assigned.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Whether new users receive this role.
    #[serde(default)]
    pub is_default: bool,
    /// Owning company, if the role is company-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
}

const fn default_true() -> bool {
    true
}

impl Role {
    /// Returns true if this is the reserved admin role (case-insensitive).
    #[must_use]
    pub fn is_reserved_admin(&self) -> bool {
        is_reserved_admin_name(&self.name)
    }

    /// Returns the assigned permission identifiers, deduplicated.
    #[must_use]
    pub fn permission_ids(&self) -> BTreeSet<PermissionId> {
        self.permissions.iter().map(|p| p.id().clone()).collect()
    }

    /// Returns true if the role references `id` in either shape.
    #[must_use]
    pub fn has_permission_id(&self, id: &PermissionId) -> bool {
        self.permissions.iter().any(|p| p.id() == id)
    }

    /// Rewrites every reference as a bare identifier.
    pub fn normalize_to_references(&mut self) {
        for slot in &mut self.permissions {
            if let PermissionRef::Populated(p) = slot {
                *slot = PermissionRef::Reference(p.id.clone());
            }
        }
    }

    /// Populates bare references from a permission catalogue.
    ///
    /// References the catalogue does not know are left as they are and
    /// their identifiers are returned.
    pub fn populate_from(&mut self, catalogue: &[Permission]) -> Vec<PermissionId> {
        let by_id: HashMap<&PermissionId, &Permission> =
            catalogue.iter().map(|p| (&p.id, p)).collect();
        let mut unknown = Vec::new();
        for slot in &mut self.permissions {
            let PermissionRef::Reference(id) = slot else {
                continue;
            };
            if let Some(p) = by_id.get(&*id) {
                *slot = PermissionRef::Populated((*p).clone());
            } else {
                unknown.push(id.clone());
            }
        }
        unknown
    }

    /// Returns true if the role is in the given company scope.
    #[must_use]
    pub fn in_scope(&self, company_id: Option<&str>) -> bool {
        self.company_id.as_deref() == company_id
    }
}

/// Returns true if `name` is the reserved admin role name.
#[must_use]
pub fn is_reserved_admin_name(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(RESERVED_ADMIN_ROLE)
}

/// Request body for creating a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRole {
    /// Role name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Initial permission set.
    pub permission_ids: Vec<PermissionId>,
    /// Whether the role is active.
    pub is_active: bool,
    /// Whether the role is the scope's default.
    #[serde(default)]
    pub is_default: bool,
    /// Owning company.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
}

impl NewRole {
    /// Validates the request before it is sent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the name is blank.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "role name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request body for updating a role's details.
///
/// Absent fields are left unchanged by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New active flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    /// New default flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl RoleUpdate {
    /// Returns true if nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.is_active.is_none()
            && self.is_default.is_none()
    }

    /// Validates the request before it is sent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if a new name is blank.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(crate::Error::InvalidInput(
                "role name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies the update to a role in place.
    pub fn apply_to(&self, role: &mut Role) {
        if let Some(name) = &self.name {
            role.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            role.description.clone_from(description);
        }
        if let Some(active) = self.is_active {
            role.is_active = active;
        }
        if let Some(default) = self.is_default {
            role.is_default = default;
        }
    }
}

/// Request body for replacing a role's permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignPermissions {
    /// The complete target set.
    pub permission_ids: Vec<PermissionId>,
}
