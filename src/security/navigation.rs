//! Navigation filtering and route guarding.
//!
//! The [`NavigationPermissionMap`] is an allow-list of *restricted* route
//! prefixes: a path that matches no entry is allowed. Lookup is plain
//! longest-string-prefix-first, so `/dashboard/settings` covers
//! `/dashboard/settings/x` and `/dashboard/settings-advanced` alike, and a
//! more specific entry always beats a shorter one.

use super::access::has_permission;
use super::gate::{AccessDenied, Rendered};
use crate::models::{Action, PermissionKey, Resource};
use crate::services::PermissionSnapshot;
use serde::{Deserialize, Serialize};

/// A restricted route prefix and the permission required to view it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Normalized route prefix, e.g. `/dashboard/roles`.
    pub prefix: String,
    /// Required permission.
    pub permission: PermissionKey,
}

impl RouteRule {
    fn matches(&self, path: &str) -> bool {
        path.starts_with(self.prefix.as_str())
    }
}

/// Route prefix → required permission, longest prefix wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationPermissionMap {
    // Sorted by prefix length descending, then lexicographically.
    rules: Vec<RouteRule>,
}

impl NavigationPermissionMap {
    /// Creates an empty map; every route is allowed.
    #[must_use]
    pub const fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// The console's built-in dashboard map.
    #[must_use]
    pub fn dashboard() -> Self {
        [
            ("/dashboard/content", Resource::Content, Action::Read),
            ("/dashboard/content/create", Resource::Content, Action::Create),
            ("/dashboard/content/edit", Resource::Content, Action::Update),
            ("/dashboard/users", Resource::User, Action::Read),
            ("/dashboard/company-users", Resource::CompanyUser, Action::Read),
            ("/dashboard/companies", Resource::Company, Action::Read),
            ("/dashboard/roles", Resource::Role, Action::Read),
            ("/dashboard/permissions", Resource::Permission, Action::Read),
            ("/dashboard/analytics", Resource::Analytics, Action::Read),
            ("/dashboard/settings", Resource::Settings, Action::Read),
        ]
        .into_iter()
        .fold(Self::new(), |map, (prefix, resource, action)| {
            map.with(prefix, PermissionKey::new(resource, action))
        })
    }

    /// Adds or replaces a rule, returning the previous permission for that prefix.
    pub fn insert(&mut self, prefix: &str, permission: PermissionKey) -> Option<PermissionKey> {
        let prefix = normalize_path(prefix).to_string();
        if let Some(existing) = self.rules.iter_mut().find(|r| r.prefix == prefix) {
            return Some(std::mem::replace(&mut existing.permission, permission));
        }
        self.rules.push(RouteRule { prefix, permission });
        self.rules.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
        None
    }

    /// Builder form of [`NavigationPermissionMap::insert`].
    #[must_use]
    pub fn with(mut self, prefix: &str, permission: PermissionKey) -> Self {
        self.insert(prefix, permission);
        self
    }

    /// Finds the most specific rule covering `path`.
    ///
    /// Query strings, fragments and trailing slashes are ignored.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&RouteRule> {
        let path = normalize_path(path);
        self.rules.iter().find(|rule| rule.matches(path))
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no route is restricted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over rules, most specific first.
    pub fn iter(&self) -> std::slice::Iter<'_, RouteRule> {
        self.rules.iter()
    }
}

impl Extend<RouteRule> for NavigationPermissionMap {
    fn extend<T: IntoIterator<Item = RouteRule>>(&mut self, iter: T) {
        for rule in iter {
            self.insert(&rule.prefix, rule.permission);
        }
    }
}

fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// One entry in the dashboard navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavItem {
    /// Display label.
    pub label: String,
    /// Link target.
    pub href: String,
    /// Permission required to see the entry; `None` means always visible.
    #[serde(default)]
    pub requires: Option<PermissionKey>,
}

impl NavItem {
    /// Creates an entry gated on `resource.read`.
    #[must_use]
    pub fn new(label: impl Into<String>, href: impl Into<String>, resource: Resource) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            requires: Some(PermissionKey::new(resource, Action::Read)),
        }
    }

    /// Creates an entry with no permission requirement.
    #[must_use]
    pub fn public(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            requires: None,
        }
    }
}

/// The console's built-in navigation, in display order.
#[must_use]
pub fn dashboard_navigation() -> Vec<NavItem> {
    vec![
        NavItem::public("Dashboard", "/dashboard"),
        NavItem::new("Content", "/dashboard/content", Resource::Content),
        NavItem::new("Users", "/dashboard/users", Resource::User),
        NavItem::new("Company Users", "/dashboard/company-users", Resource::CompanyUser),
        NavItem::new("Companies", "/dashboard/companies", Resource::Company),
        NavItem::new("Roles", "/dashboard/roles", Resource::Role),
        NavItem::new("Permissions", "/dashboard/permissions", Resource::Permission),
        NavItem::new("Analytics", "/dashboard/analytics", Resource::Analytics),
        NavItem::new("Settings", "/dashboard/settings", Resource::Settings),
    ]
}

/// Filters `items` down to the entries the principal may see.
///
/// Admins receive the full list unconditionally. Order is preserved.
#[must_use]
pub fn visible_items<'a>(items: &'a [NavItem], snapshot: &PermissionSnapshot) -> Vec<&'a NavItem> {
    let principal = snapshot.principal.as_ref();
    if principal.is_some_and(crate::models::Principal::is_admin) {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|item| {
            item.requires.is_none_or(|key| {
                has_permission(key.resource, key.action, principal, &snapshot.grants)
            })
        })
        .collect()
}

/// Outcome of guarding one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The page body may render. `rule` is the matching entry, if any.
    Allowed {
        /// The rule that matched, or `None` for unrestricted routes.
        rule: Option<RouteRule>,
    },
    /// Grants are still loading for a restricted route.
    Loading,
    /// The page body must be replaced by the denied view.
    Denied(AccessDenied),
}

impl RouteDecision {
    /// Returns true if the page body may render.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Maps the decision onto the page body; navigation chrome is rendered
    /// by the caller regardless.
    pub fn page_body<V>(self, body: V) -> Rendered<V> {
        match self {
            Self::Allowed { .. } => Rendered::Children(body),
            Self::Loading => Rendered::Loading,
            Self::Denied(denied) => Rendered::Denied(denied),
        }
    }
}

/// Checks every route change against a [`NavigationPermissionMap`].
#[derive(Debug, Clone)]
pub struct RouteGuard {
    map: NavigationPermissionMap,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(NavigationPermissionMap::dashboard())
    }
}

impl RouteGuard {
    /// Creates a guard over `map`.
    #[must_use]
    pub const fn new(map: NavigationPermissionMap) -> Self {
        Self { map }
    }

    /// Returns the underlying map.
    #[must_use]
    pub const fn map(&self) -> &NavigationPermissionMap {
        &self.map
    }

    /// Decides whether `path` may be shown.
    #[must_use]
    pub fn check(&self, path: &str, snapshot: &PermissionSnapshot) -> RouteDecision {
        let Some(rule) = self.map.resolve(path) else {
            return RouteDecision::Allowed { rule: None };
        };
        let principal = snapshot.principal.as_ref();
        let key = rule.permission;
        if has_permission(key.resource, key.action, principal, &snapshot.grants) {
            return RouteDecision::Allowed {
                rule: Some(rule.clone()),
            };
        }
        if snapshot.is_loading {
            return RouteDecision::Loading;
        }
        tracing::debug!(
            path,
            permission = %key,
            principal = principal.map(|p| p.id.as_str()),
            "Route blocked"
        );
        RouteDecision::Denied(AccessDenied::new(key.resource, key.action))
    }
}
