//! Permission vocabulary.
//!
//! Every permission in the console is named `"{resource}.{action}"`, drawn
//! from two closed enumerations. The registry, the session cache and the
//! access decision function all speak this one naming scheme.
//!
//! # Example
//!
//! ```rust
//! use console_authz::models::{Action, PermissionKey, Resource, build_name, parse_name};
//!
//! assert_eq!(build_name(Resource::CompanyUser, Action::Read), "company_user.read");
//! assert_eq!(
//!     parse_name("role.manage"),
//!     Some(PermissionKey::new(Resource::Role, Action::Manage))
//! );
//! assert_eq!(parse_name("garbage"), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between resource and action in a canonical permission name.
pub const NAME_SEPARATOR: char = '.';

/// Domain object classes subject to access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Content items.
    Content,
    /// Platform users.
    User,
    /// Users belonging to a company.
    CompanyUser,
    /// Companies.
    Company,
    /// Permission records.
    Permission,
    /// Roles.
    Role,
    /// Analytics dashboards.
    Analytics,
    /// Console settings.
    Settings,
}

impl Resource {
    /// Returns all resources in display order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Content,
            Self::User,
            Self::CompanyUser,
            Self::Company,
            Self::Permission,
            Self::Role,
            Self::Analytics,
            Self::Settings,
        ]
    }

    /// Returns the canonical tag used in permission names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::User => "user",
            Self::CompanyUser => "company_user",
            Self::Company => "company",
            Self::Permission => "permission",
            Self::Role => "role",
            Self::Analytics => "analytics",
            Self::Settings => "settings",
        }
    }

    /// Returns the heading used when grouping permissions by resource.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Content => "Content",
            Self::User => "Users",
            Self::CompanyUser => "Company Users",
            Self::Company => "Companies",
            Self::Permission => "Permissions",
            Self::Role => "Roles",
            Self::Analytics => "Analytics",
            Self::Settings => "Settings",
        }
    }

    /// Returns the lowercase phrase used inside sentences ("company user").
    #[must_use]
    pub const fn phrase(&self) -> &'static str {
        match self {
            Self::CompanyUser => "company user",
            other => other.as_str(),
        }
    }

    /// Parses a canonical resource tag.
    ///
    /// Only the exact lowercase tag is accepted so that parsed names always
    /// agree with the names compared by the decision function.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation categories on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create new records.
    Create,
    /// View records.
    Read,
    /// Modify records.
    Update,
    /// Remove records.
    Delete,
    /// Every other action on the same resource.
    Manage,
}

impl Action {
    /// Returns all actions.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Create,
            Self::Read,
            Self::Update,
            Self::Delete,
            Self::Manage,
        ]
    }

    /// Returns the canonical tag used in permission names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Manage => "manage",
        }
    }

    /// Returns the verb phrase used inside sentences ("view" for read).
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Read => "view",
            other => other.as_str(),
        }
    }

    /// Returns true for the superset action.
    #[must_use]
    pub const fn is_manage(&self) -> bool {
        matches!(self, Self::Manage)
    }

    /// Parses a canonical action tag.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(resource, action)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionKey {
    /// The resource.
    pub resource: Resource,
    /// The action.
    pub action: Action,
}

impl PermissionKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }

    /// Returns every key in the vocabulary, resource-major.
    #[must_use]
    pub fn all() -> Vec<Self> {
        Resource::all()
            .iter()
            .flat_map(|r| Action::all().iter().map(move |a| Self::new(*r, *a)))
            .collect()
    }

    /// Returns the canonical name.
    #[must_use]
    pub fn name(&self) -> String {
        build_name(self.resource, self.action)
    }

    /// Returns the `manage` key on the same resource.
    #[must_use]
    pub const fn blanket(&self) -> Self {
        Self::new(self.resource, Action::Manage)
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{NAME_SEPARATOR}{}", self.resource, self.action)
    }
}

impl FromStr for PermissionKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_name(s).ok_or_else(|| crate::Error::InvalidInput(format!("unknown permission: {s}")))
    }
}

impl Serialize for PermissionKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PermissionKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_name(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown permission: {raw}")))
    }
}

/// Builds the canonical `"{resource}.{action}"` name.
#[must_use]
pub fn build_name(resource: Resource, action: Action) -> String {
    format!("{resource}{NAME_SEPARATOR}{action}")
}

/// Parses a canonical name back into its pair.
///
/// Returns `None` for anything that is not exactly two known tags joined by
/// a single separator.
#[must_use]
pub fn parse_name(name: &str) -> Option<PermissionKey> {
    let (resource, action) = name.split_once(NAME_SEPARATOR)?;
    Some(PermissionKey::new(
        Resource::parse(resource)?,
        Action::parse(action)?,
    ))
}

/// Registry-side permission identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(String);

impl PermissionId {
    /// Creates a permission ID.
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

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermissionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PermissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A permission record as stored by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    /// Registry identifier.
    #[serde(rename = "_id", alias = "id")]
    pub id: PermissionId,
    /// Canonical name, `"{resource}.{action}"`.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Resource tag.
    pub resource: Resource,
    /// Action tag.
    pub action: Action,
    /// Whether the permission can currently be assigned.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

const fn default_true() -> bool {
    true
}

impl Permission {
    /// Creates an active permission whose name is derived from the pair.
    #[must_use]
    pub fn new(id: impl Into<PermissionId>, resource: Resource, action: Action) -> Self {
        Self {
            id: id.into(),
            name: build_name(resource, action),
            description: format!("{} {}", capitalize(action.verb()), resource.phrase()),
            resource,
            action,
            is_active: true,
        }
    }

    /// Returns the `(resource, action)` pair.
    #[must_use]
    pub const fn key(&self) -> PermissionKey {
        PermissionKey::new(self.resource, self.action)
    }

    /// Returns true if `name` matches the resource/action tags.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.name == self.key().name()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// A permission granted to the signed-in principal.
///
/// This is the shape returned by the backend's granted-permissions
/// endpoint and the shape persisted by the session cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedPermission {
    /// Registry identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Canonical name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl GrantedPermission {
    /// Creates a granted permission.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
        }
    }
}

impl From<&Permission> for GrantedPermission {
    fn from(p: &Permission) -> Self {
        Self {
            id: p.id.as_str().to_string(),
            name: p.name.clone(),
            description: p.description.clone(),
        }
    }
}

/// Ordered set of permissions granted to the current principal.
///
/// Serializes as a bare JSON array of `{id, name, description}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantedPermissionSet {
    permissions: Vec<GrantedPermission>,
}

impl GrantedPermissionSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            permissions: Vec::new(),
        }
    }

    /// Creates a set from names only; ids mirror the names.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(|name| {
                let name = name.into();
                GrantedPermission::new(name.clone(), name)
            })
            .collect()
    }

    /// Returns true if a permission with exactly this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == name)
    }

    /// Returns the number of grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Returns true if nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Iterates over the grants in order.
    pub fn iter(&self) -> std::slice::Iter<'_, GrantedPermission> {
        self.permissions.iter()
    }

    /// Returns the grant names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.permissions.iter().map(|p| p.name.as_str()).collect()
    }

    /// Returns the grants as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[GrantedPermission] {
        &self.permissions
    }
}

impl FromIterator<GrantedPermission> for GrantedPermissionSet {
    fn from_iter<T: IntoIterator<Item = GrantedPermission>>(iter: T) -> Self {
        Self {
            permissions: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<GrantedPermission>> for GrantedPermissionSet {
    fn from(permissions: Vec<GrantedPermission>) -> Self {
        Self { permissions }
    }
}

impl<'a> IntoIterator for &'a GrantedPermissionSet {
    type Item = &'a GrantedPermission;
    type IntoIter = std::slice::Iter<'a, GrantedPermission>;

    fn into_iter(self) -> Self::IntoIter {
        self.permissions.iter()
    }
}
