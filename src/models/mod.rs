//! Data models for permissions, roles and principals.

mod permission;
mod principal;
mod role;

pub use permission::{
    Action, GrantedPermission, GrantedPermissionSet, NAME_SEPARATOR, Permission, PermissionId,
    PermissionKey, Resource, build_name, parse_name,
};
pub use principal::{Principal, UserType};
pub use role::{
    AssignPermissions, NewRole, PermissionRef, RESERVED_ADMIN_ROLE, Role, RoleId, RoleUpdate,
    is_reserved_admin_name,
};
