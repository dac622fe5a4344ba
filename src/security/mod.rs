//! Access control.
//!
//! The decision function, the declarative gate, navigation filtering and
//! audit logging.

mod access;
mod audit;
mod gate;
mod navigation;

pub use access::{
    AccessResult, DenyReason, GrantReason, check_access, has_all_permissions, has_any_permission,
    has_permission,
};
pub use audit::{AuditConfig, AuditEntry, AuditLogger, AuditOutcome};
pub use gate::{AccessDenied, Gate, Rendered};
pub use navigation::{
    NavItem, NavigationPermissionMap, RouteDecision, RouteGuard, RouteRule, dashboard_navigation,
    visible_items,
};
