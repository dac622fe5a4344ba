//! The signed-in actor.

use serde::{Deserialize, Serialize};

/// Account type supplied by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserType {
    /// Console administrator; every decision is allowed.
    #[serde(rename = "admin", alias = "Admin")]
    Admin,
    /// Company staff; decisions come from the granted permission set.
    #[serde(rename = "company_user", alias = "CompanyUser", alias = "companyUser")]
    CompanyUser,
    /// Public user; no dashboard permissions at all.
    #[serde(rename = "user", alias = "RegularUser", alias = "regular_user")]
    RegularUser,
}

impl UserType {
    /// Returns the wire tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::CompanyUser => "company_user",
            Self::RegularUser => "user",
        }
    }

    /// Parses a user type tag.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "company_user" | "companyuser" | "company-user" => Some(Self::CompanyUser),
            "user" | "regular_user" | "regularuser" => Some(Self::RegularUser),
            _ => None,
        }
    }

    /// Returns true if permission grants must be fetched for this type.
    #[must_use]
    pub const fn uses_grants(&self) -> bool {
        matches!(self, Self::CompanyUser)
    }
}

/// The authenticated principal whose access is being decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// User identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Account type.
    pub user_type: UserType,
    /// Role tag, if the authentication layer supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl Principal {
    /// Creates a principal with empty contact details.
    #[must_use]
    pub fn new(id: impl Into<String>, user_type: UserType) -> Self {
        Self {
            id: id.into(),
            user_type,
            role: None,
            email: String::new(),
            name: String::new(),
        }
    }

    /// Creates an admin principal.
    #[must_use]
    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, UserType::Admin)
    }

    /// Creates a company-user principal.
    #[must_use]
    pub fn company_user(id: impl Into<String>) -> Self {
        Self::new(id, UserType::CompanyUser)
    }

    /// Creates a regular-user principal.
    #[must_use]
    pub fn regular_user(id: impl Into<String>) -> Self {
        Self::new(id, UserType::RegularUser)
    }

    /// Sets the role tag.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns true for admins.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.user_type, UserType::Admin)
    }

    /// Returns true if `other` is the same account.
    #[must_use]
    pub fn same_account(&self, other: &Self) -> bool {
        self.id == other.id && self.user_type == other.user_type
    }
}
