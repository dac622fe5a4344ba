//! Access decision function.
//!
//! # Algorithm
//!
//! Evaluated in order, short-circuiting:
//!
//! | Step | Condition | Result |
//! |------|-----------|--------|
//! | 1 | no principal | deny |
//! | 2 | `UserType::Admin` | allow |
//! | 3 | `UserType::RegularUser` | deny |
//! | 4 | grants contain `resource.action` or `resource.manage` | allow, else deny |
//!
//! `manage` is the only superset action, and it never reaches across
//! resources. The functions here never fail: an uninitialized or loading
//! cache is simply an empty [`GrantedPermissionSet`], so the default is deny.
//!
//! # Example
//!
//! ```rust
//! use console_authz::models::{Action, GrantedPermissionSet, Principal, Resource};
//! use console_authz::security::{check_access, has_permission};
//!
//! let reader = Principal::company_user("u-1");
//! let grants = GrantedPermissionSet::from_names(["content.read"]);
//!
//! assert!(has_permission(Resource::Content, Action::Read, Some(&reader), &grants));
//! assert!(check_access(Resource::Content, Action::Create, Some(&reader), &grants).is_denied());
//! ```

use crate::models::{Action, GrantedPermissionSet, PermissionKey, Principal, Resource, UserType};

/// Decides whether `principal` may perform `action` on `resource`.
#[must_use]
pub fn has_permission(
    resource: Resource,
    action: Action,
    principal: Option<&Principal>,
    grants: &GrantedPermissionSet,
) -> bool {
    decide(PermissionKey::new(resource, action), principal, grants).is_granted()
}

/// Returns true if at least one of `checks` is allowed.
#[must_use]
pub fn has_any_permission(
    checks: &[(Resource, Action)],
    principal: Option<&Principal>,
    grants: &GrantedPermissionSet,
) -> bool {
    checks
        .iter()
        .any(|(resource, action)| has_permission(*resource, *action, principal, grants))
}

/// Returns true if every one of `checks` is allowed.
///
/// An empty `checks` list is allowed only for a present, non-regular
/// principal; absence of a principal always denies.
#[must_use]
pub fn has_all_permissions(
    checks: &[(Resource, Action)],
    principal: Option<&Principal>,
    grants: &GrantedPermissionSet,
) -> bool {
    let Some(principal) = principal else {
        return false;
    };
    if matches!(principal.user_type, UserType::RegularUser) {
        return false;
    }
    checks
        .iter()
        .all(|(resource, action)| has_permission(*resource, *action, Some(principal), grants))
}

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    /// Access granted.
    Granted(GrantReason),
    /// Access denied.
    Denied(DenyReason),
}

/// Why access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReason {
    /// The principal is an admin.
    Admin,
    /// The exact permission is granted.
    Exact,
    /// `resource.manage` is granted.
    Manage,
}

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Nobody is signed in.
    NoPrincipal,
    /// Regular users never receive dashboard permissions.
    RegularUser,
    /// Neither the exact nor the `manage` permission is granted.
    NotGranted,
}

impl AccessResult {
    /// Returns true if access was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    /// Returns true if access was denied.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    /// Returns a short label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Granted(GrantReason::Admin) => "granted_admin",
            Self::Granted(GrantReason::Exact) => "granted_exact",
            Self::Granted(GrantReason::Manage) => "granted_manage",
            Self::Denied(DenyReason::NoPrincipal) => "denied_no_principal",
            Self::Denied(DenyReason::RegularUser) => "denied_regular_user",
            Self::Denied(DenyReason::NotGranted) => "denied_not_granted",
        }
    }
}

/// Decides access and reports the reason.
#[must_use]
pub fn check_access(
    resource: Resource,
    action: Action,
    principal: Option<&Principal>,
    grants: &GrantedPermissionSet,
) -> AccessResult {
    decide(PermissionKey::new(resource, action), principal, grants)
}

fn decide(
    key: PermissionKey,
    principal: Option<&Principal>,
    grants: &GrantedPermissionSet,
) -> AccessResult {
    let Some(principal) = principal else {
        return AccessResult::Denied(DenyReason::NoPrincipal);
    };
    match principal.user_type {
        UserType::Admin => AccessResult::Granted(GrantReason::Admin),
        UserType::RegularUser => AccessResult::Denied(DenyReason::RegularUser),
        UserType::CompanyUser => {
            if grants.contains(&key.name()) {
                AccessResult::Granted(GrantReason::Exact)
            } else if grants.contains(&key.blanket().name()) {
                AccessResult::Granted(GrantReason::Manage)
            } else {
                AccessResult::Denied(DenyReason::NotGranted)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company_user() -> Principal {
        Principal::company_user("u-1")
    }

    #[test]
    fn test_no_principal_denied() {
        let grants = GrantedPermissionSet::from_names(["content.read"]);
        assert!(!has_permission(Resource::Content, Action::Read, None, &grants));
        assert_eq!(
            check_access(Resource::Content, Action::Read, None, &grants),
            AccessResult::Denied(DenyReason::NoPrincipal)
        );
    }

    #[test]
    fn test_admin_bypasses_empty_grants() {
        let admin = Principal::admin("a-1");
        let grants = GrantedPermissionSet::empty();
        for key in PermissionKey::all() {
            assert!(has_permission(key.resource, key.action, Some(&admin), &grants));
        }
    }

    #[test]
    fn test_regular_user_ignores_grants() {
        let user = Principal::regular_user("r-1");
        let grants = GrantedPermissionSet::from_names(
            PermissionKey::all().iter().map(PermissionKey::name),
        );
        for key in PermissionKey::all() {
            assert!(!has_permission(key.resource, key.action, Some(&user), &grants));
        }
    }

    #[test]
    fn test_exact_grant() {
        let grants = GrantedPermissionSet::from_names(["content.read"]);
        let principal = company_user();
        assert_eq!(
            check_access(Resource::Content, Action::Read, Some(&principal), &grants),
            AccessResult::Granted(GrantReason::Exact)
        );
        assert!(!has_permission(
            Resource::Content,
            Action::Create,
            Some(&principal),
            &grants
        ));
    }

    #[test]
    fn test_manage_covers_every_action_on_resource() {
        let grants = GrantedPermissionSet::from_names(["role.manage"]);
        let principal = company_user();
        for action in Action::all() {
            assert!(has_permission(Resource::Role, *action, Some(&principal), &grants));
        }
        assert_eq!(
            check_access(Resource::Role, Action::Update, Some(&principal), &grants),
            AccessResult::Granted(GrantReason::Manage)
        );
    }

    #[test]
    fn test_manage_does_not_cross_resources() {
        let grants = GrantedPermissionSet::from_names(["role.manage"]);
        let principal = company_user();
        assert!(!has_permission(
            Resource::Permission,
            Action::Read,
            Some(&principal),
            &grants
        ));
    }

    #[test]
    fn test_other_actions_are_not_supersets() {
        let grants = GrantedPermissionSet::from_names(["settings.update", "settings.delete"]);
        let principal = company_user();
        assert!(!has_permission(
            Resource::Settings,
            Action::Read,
            Some(&principal),
            &grants
        ));
        assert!(!has_permission(
            Resource::Settings,
            Action::Manage,
            Some(&principal),
            &grants
        ));
    }

    #[test]
    fn test_has_any_permission() {
        let grants = GrantedPermissionSet::from_names(["analytics.read"]);
        let principal = company_user();
        assert!(has_any_permission(
            &[(Resource::Content, Action::Read), (Resource::Analytics, Action::Read)],
            Some(&principal),
            &grants
        ));
        assert!(!has_any_permission(
            &[(Resource::Content, Action::Read), (Resource::User, Action::Read)],
            Some(&principal),
            &grants
        ));
        assert!(!has_any_permission(&[], Some(&principal), &grants));
    }

    #[test]
    fn test_has_all_permissions() {
        let grants = GrantedPermissionSet::from_names(["content.manage", "analytics.read"]);
        let principal = company_user();
        assert!(has_all_permissions(
            &[(Resource::Content, Action::Delete), (Resource::Analytics, Action::Read)],
            Some(&principal),
            &grants
        ));
        assert!(!has_all_permissions(
            &[(Resource::Content, Action::Delete), (Resource::Analytics, Action::Update)],
            Some(&principal),
            &grants
        ));
        assert!(!has_all_permissions(&[], None, &grants));
        assert!(!has_all_permissions(
            &[],
            Some(&Principal::regular_user("r")),
            &grants
        ));
    }
}
