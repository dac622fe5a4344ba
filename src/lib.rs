//! # Console Authz
//!
//! Authorization model for a content-management console.
//!
//! Every protected view and navigation entry in the console asks one
//! question: may the signed-in principal perform `action` on `resource`?
//! This crate owns the vocabulary that question is phrased in, the
//! per-session cache of granted permissions, the decision function, and the
//! primitives built on it.
//!
//! ## Features
//!
//! - Closed `resource.action` permission vocabulary with `manage` as the
//!   only superset action
//! - Pure access decision function with admin/regular-user overrides
//! - Session-scoped, persisted permission cache with an explicit lifecycle
//! - Declarative gate and longest-prefix navigation filter
//! - Role administration state machine over a pluggable registry client
//!
//! These checks are a presentation convenience. The backend must enforce
//! the same `resource.action` and `manage` semantics on its side.
//!
//! ## Example
//!
//! ```rust
//! use console_authz::models::{Action, GrantedPermissionSet, Principal, Resource};
//! use console_authz::security::has_permission;
//!
//! let principal = Principal::company_user("u-1");
//! let grants = GrantedPermissionSet::from_names(["role.manage"]);
//!
//! assert!(has_permission(Resource::Role, Action::Delete, Some(&principal), &grants));
//! assert!(!has_permission(Resource::Content, Action::Read, Some(&principal), &grants));
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;

pub use config::ConsoleConfig;
pub use models::{
    Action, GrantedPermission, GrantedPermissionSet, Permission, PermissionId, PermissionKey,
    Principal, Resource, Role, RoleId, UserType,
};
pub use security::{Gate, NavigationPermissionMap, RouteGuard, has_any_permission, has_permission};
pub use services::{HttpRegistryClient, PermissionSession, RegistryClient, RoleAdministration};
pub use storage::{FilesystemGrantStore, GrantStore, MemoryGrantStore};

/// Error type for console authorization operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Blank role names, unsafe storage keys, bad config values |
/// | `OperationFailed` | I/O, serialization, transport errors, non-2xx registry responses |
/// | `Unauthorized` | The registry rejected the session's credentials (HTTP 401) |
/// | `PermissionDenied` | A client-side decision refused an administrative operation |
/// | `ProtectedRole` | Deleting the reserved admin role |
/// | `NotFound` | Unknown role or permission id |
/// | `InvalidState` | A role-editor transition requested from the wrong state |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - The grant store cannot be read or written
    /// - A registry request fails in transport or returns a non-2xx status
    /// - A response body cannot be decoded
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The registry rejected the session's credentials.
    ///
    /// The session tears itself down when a refresh sees this error.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The principal lacks the permission required for an operation.
    #[error("permission '{permission}' required")]
    PermissionDenied {
        /// Canonical name of the missing permission.
        permission: String,
    },

    /// The role is protected from deletion.
    #[error("role '{name}' is protected and cannot be deleted")]
    ProtectedRole {
        /// Name of the protected role.
        name: String,
    },

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A state-machine transition is not allowed from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Builds an `OperationFailed` error.
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for console authorization operations.
pub type Result<T> = std::result::Result<T, Error>;
