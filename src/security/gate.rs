//! Declarative gate.
//!
//! A [`Gate`] wraps a view behind a single `(resource, action)` decision.
//! It carries no authorization logic of its own: the outcome is a pure
//! function of the session snapshot and [`has_permission`].

use super::access::has_permission;
use crate::models::{Action, PermissionKey, Resource};
use crate::services::PermissionSnapshot;
use std::fmt;

/// The default "access denied" representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    /// The permission that was missing.
    pub key: PermissionKey,
}

impl AccessDenied {
    /// Creates a denial for `resource`/`action`.
    #[must_use]
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self {
            key: PermissionKey::new(resource, action),
        }
    }

    /// Short title for the denied view.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        "Access Denied"
    }

    /// Human-readable message, e.g. "You don't have permission to delete content."
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "You don't have permission to {} {}.",
            self.key.action.verb(),
            self.key.resource.phrase()
        )
    }
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}

/// What a gate decided to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<V> {
    /// The session is still establishing its grants.
    Loading,
    /// Access granted; the wrapped view.
    Children(V),
    /// Access denied; the caller-supplied fallback.
    Fallback(V),
    /// Access denied and no fallback was supplied.
    Denied(AccessDenied),
}

impl<V> Rendered<V> {
    /// Returns true if the wrapped view is shown.
    #[must_use]
    pub const fn is_children(&self) -> bool {
        matches!(self, Self::Children(_))
    }

    /// Returns true if the loader is shown.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Collapses the outcome into a single view.
    pub fn resolve(
        self,
        loading: impl FnOnce() -> V,
        denied: impl FnOnce(&AccessDenied) -> V,
    ) -> V {
        match self {
            Self::Loading => loading(),
            Self::Children(v) | Self::Fallback(v) => v,
            Self::Denied(d) => denied(&d),
        }
    }
}

/// Conditional rendering on one permission.
///
/// # Example
///
/// ```rust
/// use console_authz::models::{Action, Principal, Resource};
/// use console_authz::security::{Gate, Rendered};
/// use console_authz::services::PermissionSnapshot;
///
/// let snapshot = PermissionSnapshot::ready(Some(Principal::admin("a-1")), Default::default());
/// let outcome = Gate::new(Resource::Settings, Action::Update).render(&snapshot, "settings form");
/// assert_eq!(outcome, Rendered::Children("settings form"));
/// ```
#[derive(Debug, Clone)]
pub struct Gate<V> {
    key: PermissionKey,
    fallback: Option<V>,
    show_loader: bool,
}

impl<V> Gate<V> {
    /// Creates a gate that shows a loader while grants are loading.
    #[must_use]
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self {
            key: PermissionKey::new(resource, action),
            fallback: None,
            show_loader: true,
        }
    }

    /// Sets the view shown instead of the default denial.
    #[must_use]
    pub fn fallback(mut self, fallback: V) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Controls whether the loader is shown while grants are loading.
    ///
    /// Without the loader, a loading session is decided like any other,
    /// against whatever grants are already in memory.
    #[must_use]
    pub fn show_loader(mut self, show: bool) -> Self {
        self.show_loader = show;
        self
    }

    /// Returns the gated permission.
    #[must_use]
    pub const fn key(&self) -> PermissionKey {
        self.key
    }

    /// Decides what to show for `children`.
    pub fn render(self, snapshot: &PermissionSnapshot, children: V) -> Rendered<V> {
        self.render_with(snapshot, || children)
    }

    /// Like [`Gate::render`], building `children` only when access is granted.
    pub fn render_with(
        self,
        snapshot: &PermissionSnapshot,
        children: impl FnOnce() -> V,
    ) -> Rendered<V> {
        if snapshot.is_loading && self.show_loader {
            return Rendered::Loading;
        }
        if has_permission(
            self.key.resource,
            self.key.action,
            snapshot.principal.as_ref(),
            &snapshot.grants,
        ) {
            return Rendered::Children(children());
        }
        match self.fallback {
            Some(fallback) => Rendered::Fallback(fallback),
            None => Rendered::Denied(AccessDenied::new(self.key.resource, self.key.action)),
        }
    }
}
