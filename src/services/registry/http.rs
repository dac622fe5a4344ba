//! HTTP registry client.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | granted permissions | `GET /users/me/permissions` |
//! | permission catalogue | `GET /permissions`, `/permissions/resource/{r}`, `/permissions/action/{a}` |
//! | roles | `GET /roles[?companyId=]` |
//! | create role | `POST /roles` |
//! | update role | `PUT /roles/{id}` |
//! | assign permissions | `POST /roles/{id}/permissions` |
//! | delete role | `DELETE /roles/{id}` |
//!
//! Response bodies may be bare or wrapped in `{"data": ...}`.

use super::{Envelope, PermissionFilter, RegistryClient};
use crate::config::ApiConfig;
use crate::models::{
    AssignPermissions, GrantedPermissionSet, NewRole, Permission, PermissionId, Role, RoleId,
    RoleUpdate,
};
use crate::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Blocking HTTP client for the registry API.
pub struct HttpRegistryClient {
    base_url: String,
    token: Option<SecretString>,
    client: Client,
}

impl std::fmt::Debug for HttpRegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistryClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRegistryClient {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client for `base_url` with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client: build_http_client(Self::DEFAULT_TIMEOUT),
        }
    }

    /// Creates a client from API configuration.
    #[must_use]
    pub fn from_config(config: &ApiConfig) -> Self {
        let mut client = Self::new(&config.base_url)
            .with_timeout(Duration::from_secs(config.timeout_secs));
        client.token.clone_from(&config.token);
        client
    }

    /// Sets the bearer token sent with every request.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Rebuilds the underlying client with a new timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_http_client(timeout);
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else if e.is_request() {
                "request"
            } else {
                "unknown"
            };
            tracing::warn!(
                operation,
                error = %e,
                error_kind,
                "Registry request failed"
            );
            Error::operation(operation, format!("{error_kind} error: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        tracing::warn!(operation, status = %status, "Registry returned error status");
        Err(status_error(operation, status, &body))
    }

    fn decode<T: DeserializeOwned>(operation: &'static str, response: Response) -> Result<T> {
        let body = response
            .text()
            .map_err(|e| Error::operation(operation, e))?;
        decode_body(operation, &body)
    }

    fn get<T: DeserializeOwned>(&self, operation: &'static str, path: &str) -> Result<T> {
        let response = self.send(operation, self.client.get(self.url(path)))?;
        Self::decode(operation, response)
    }
}

impl RegistryClient for HttpRegistryClient {
    fn fetch_granted_permissions(&self) -> Result<GrantedPermissionSet> {
        self.get("fetch_granted_permissions", "/users/me/permissions")
    }

    fn list_permissions(&self, filter: &PermissionFilter) -> Result<Vec<Permission>> {
        let path = permissions_path(filter);
        let permissions: Vec<Permission> = self.get("list_permissions", &path)?;
        // The backend filters by one dimension per request.
        Ok(permissions.into_iter().filter(|p| filter.matches(p)).collect())
    }

    fn list_roles(&self, company_id: Option<&str>) -> Result<Vec<Role>> {
        let mut request = self.client.get(self.url("/roles"));
        if let Some(company_id) = company_id {
            request = request.query(&[("companyId", company_id)]);
        }
        let response = self.send("list_roles", request)?;
        Self::decode("list_roles", response)
    }

    fn create_role(&self, role: &NewRole) -> Result<Role> {
        role.validate()?;
        let request = self.client.post(self.url("/roles")).json(role);
        let response = self.send("create_role", request)?;
        Self::decode("create_role", response)
    }

    fn update_role(&self, id: &RoleId, update: &RoleUpdate) -> Result<Role> {
        update.validate()?;
        let request = self
            .client
            .put(self.url(&format!("/roles/{}", path_segment(id.as_str())?)))
            .json(update);
        let response = self.send("update_role", request)?;
        Self::decode("update_role", response)
    }

    fn assign_permissions(&self, id: &RoleId, permission_ids: &[PermissionId]) -> Result<Role> {
        let body = AssignPermissions {
            permission_ids: permission_ids.to_vec(),
        };
        let request = self
            .client
            .post(self.url(&format!(
                "/roles/{}/permissions",
                path_segment(id.as_str())?
            )))
            .json(&body);
        let response = self.send("assign_permissions", request)?;
        Self::decode("assign_permissions", response)
    }

    fn delete_role(&self, id: &RoleId) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/roles/{}", path_segment(id.as_str())?)));
        self.send("delete_role", request)?;
        Ok(())
    }
}

fn build_http_client(timeout: Duration) -> Client {
    let mut builder = Client::builder();
    if !timeout.is_zero() {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build registry HTTP client: {err}");
        Client::new()
    })
}

fn permissions_path(filter: &PermissionFilter) -> String {
    match (filter.resource, filter.action) {
        (Some(resource), _) => format!("/permissions/resource/{}", resource.as_str()),
        (None, Some(action)) => format!("/permissions/action/{}", action.as_str()),
        (None, None) => "/permissions".to_string(),
    }
}

// Ids are opaque registry strings; anything that could alter the path is rejected.
fn path_segment(id: &str) -> Result<&str> {
    if id.is_empty() || id.contains(['/', '?', '#', '%']) || id == "." || id == ".." {
        return Err(Error::InvalidInput(format!("invalid registry id: {id:?}")));
    }
    Ok(id)
}

fn decode_body<T: DeserializeOwned>(operation: &'static str, body: &str) -> Result<T> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(Envelope::into_inner)
        .map_err(|e| {
            tracing::warn!(operation, error = %e, "Failed to decode registry response");
            Error::operation(operation, format!("invalid response body: {e}"))
        })
}

fn status_error(operation: &'static str, status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED => Error::Unauthorized(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::operation(operation, format!("status {status}: {message}")),
    }
}
