//! In-memory registry.
//!
//! Behaves like the backend for local development and tests: populates
//! role permissions from its catalogue, keeps at most one default role per
//! company scope, and can be told to fail the next requests.

use super::{PermissionFilter, RegistryClient};
use crate::models::{
    GrantedPermission, GrantedPermissionSet, NewRole, Permission, PermissionId, PermissionRef,
    Role, RoleId, RoleUpdate,
};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A failure the registry reports instead of serving requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Transport failure.
    Offline,
    /// HTTP 401.
    Unauthorized,
}

#[derive(Debug, Default)]
struct State {
    permissions: Vec<Permission>,
    roles: Vec<Role>,
    granted: GrantedPermissionSet,
    // Grants are derived from this role when set.
    current_role: Option<RoleId>,
    in_use: HashSet<RoleId>,
    failure: Option<InjectedFailure>,
}

/// Registry held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
    requests: AtomicUsize,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose catalogue holds every `resource.action` pair.
    ///
    /// Permission ids are the canonical names.
    #[must_use]
    pub fn with_full_catalogue() -> Self {
        let registry = Self::new();
        if let Ok(mut state) = registry.state.lock() {
            state.permissions = crate::models::PermissionKey::all()
                .into_iter()
                .map(|key| Permission::new(key.name(), key.resource, key.action))
                .collect();
        }
        registry
    }

    /// Adds a permission to the catalogue.
    pub fn add_permission(&self, permission: Permission) {
        if let Ok(mut state) = self.state.lock() {
            state.permissions.retain(|p| p.id != permission.id);
            state.permissions.push(permission);
        }
    }

    /// Inserts or replaces a role as stored, without validation.
    pub fn insert_role(&self, mut role: Role) {
        role.normalize_to_references();
        if let Ok(mut state) = self.state.lock() {
            state.roles.retain(|r| r.id != role.id);
            state.roles.push(role);
        }
    }

    /// Sets a fixed granted set for the signed-in principal.
    pub fn set_granted(&self, granted: GrantedPermissionSet) {
        if let Ok(mut state) = self.state.lock() {
            state.granted = granted;
            state.current_role = None;
        }
    }

    /// Derives the signed-in principal's grants from `role_id`.
    pub fn set_current_role(&self, role_id: RoleId) {
        if let Ok(mut state) = self.state.lock() {
            state.current_role = Some(role_id);
        }
    }

    /// Marks a role as assigned to users, so deleting it fails.
    pub fn mark_in_use(&self, role_id: RoleId) {
        if let Ok(mut state) = self.state.lock() {
            state.in_use.insert(role_id);
        }
    }

    /// Makes every subsequent request fail, or clears the failure.
    pub fn set_failure(&self, failure: Option<InjectedFailure>) {
        if let Ok(mut state) = self.state.lock() {
            state.failure = failure;
        }
    }

    /// Returns the number of requests served or refused so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Returns a stored role with its permissions as stored (references).
    #[must_use]
    pub fn stored_role(&self, id: &RoleId) -> Option<Role> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.roles.iter().find(|r| &r.id == id).cloned())
    }

    fn begin(&self, operation: &'static str) -> Result<std::sync::MutexGuard<'_, State>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let state = self
            .state
            .lock()
            .map_err(|_| Error::operation(operation, "registry lock poisoned"))?;
        let failure = state.failure.clone();
        match failure {
            Some(InjectedFailure::Offline) => {
                Err(Error::operation(operation, "connect error: registry offline"))
            },
            Some(InjectedFailure::Unauthorized) => {
                Err(Error::Unauthorized("session expired".to_string()))
            },
            None => Ok(state),
        }
    }
}

impl State {
    fn populated(&self, role: &Role) -> Role {
        let mut role = role.clone();
        role.populate_from(&self.permissions);
        role
    }

    fn role_mut(&mut self, id: &RoleId) -> Result<&mut Role> {
        self.roles
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| Error::NotFound(format!("role {id}")))
    }

    fn check_permission_ids(&self, ids: &[PermissionId]) -> Result<()> {
        if let Some(unknown) = ids
            .iter()
            .find(|id| !self.permissions.iter().any(|p| &p.id == *id))
        {
            return Err(Error::InvalidInput(format!("unknown permission id: {unknown}")));
        }
        Ok(())
    }

    fn check_unique_name(&self, name: &str, scope: Option<&str>, except: Option<&RoleId>) -> Result<()> {
        let clash = self.roles.iter().any(|r| {
            Some(&r.id) != except && r.in_scope(scope) && r.name.trim().eq_ignore_ascii_case(name.trim())
        });
        if clash {
            return Err(Error::InvalidInput(format!("role name already exists: {name}")));
        }
        Ok(())
    }

    // At most one default role per company scope.
    fn clear_other_defaults(&mut self, keep: &RoleId) {
        let Some(scope) = self
            .roles
            .iter()
            .find(|r| &r.id == keep)
            .map(|r| r.company_id.clone())
        else {
            return;
        };
        for role in &mut self.roles {
            if &role.id != keep && role.company_id == scope {
                role.is_default = false;
            }
        }
    }

    fn granted(&self) -> GrantedPermissionSet {
        let Some(role_id) = &self.current_role else {
            return self.granted.clone();
        };
        self.roles
            .iter()
            .find(|r| &r.id == role_id)
            .filter(|r| r.is_active)
            .map(|r| {
                let ids = r.permission_ids();
                self.permissions
                    .iter()
                    .filter(|p| p.is_active && ids.contains(&p.id))
                    .map(GrantedPermission::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl RegistryClient for InMemoryRegistry {
    fn fetch_granted_permissions(&self) -> Result<GrantedPermissionSet> {
        let state = self.begin("fetch_granted_permissions")?;
        Ok(state.granted())
    }

    fn list_permissions(&self, filter: &PermissionFilter) -> Result<Vec<Permission>> {
        let state = self.begin("list_permissions")?;
        Ok(state
            .permissions
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    fn list_roles(&self, company_id: Option<&str>) -> Result<Vec<Role>> {
        let state = self.begin("list_roles")?;
        Ok(state
            .roles
            .iter()
            .filter(|r| company_id.is_none() || r.in_scope(company_id))
            .map(|r| state.populated(r))
            .collect())
    }

    fn create_role(&self, role: &NewRole) -> Result<Role> {
        let mut state = self.begin("create_role")?;
        role.validate()?;
        state.check_unique_name(&role.name, role.company_id.as_deref(), None)?;
        state.check_permission_ids(&role.permission_ids)?;

        let created = Role {
            id: RoleId::new(uuid::Uuid::new_v4().simple().to_string()),
            name: role.name.trim().to_string(),
            description: role.description.clone(),
            permissions: role
                .permission_ids
                .iter()
                .cloned()
                .map(PermissionRef::Reference)
                .collect(),
            is_active: role.is_active,
            is_default: role.is_default,
            company_id: role.company_id.clone(),
        };
        let id = created.id.clone();
        state.roles.push(created);
        if role.is_default {
            state.clear_other_defaults(&id);
        }
        let stored = state.role_mut(&id)?.clone();
        Ok(state.populated(&stored))
    }

    fn update_role(&self, id: &RoleId, update: &RoleUpdate) -> Result<Role> {
        let mut state = self.begin("update_role")?;
        update.validate()?;
        let scope = state.role_mut(id)?.company_id.clone();
        if let Some(name) = &update.name {
            state.check_unique_name(name, scope.as_deref(), Some(id))?;
        }
        let role = state.role_mut(id)?;
        update.apply_to(role);
        let is_default = role.is_default;
        if is_default {
            state.clear_other_defaults(id);
        }
        let stored = state.role_mut(id)?.clone();
        Ok(state.populated(&stored))
    }

    fn assign_permissions(&self, id: &RoleId, permission_ids: &[PermissionId]) -> Result<Role> {
        let mut state = self.begin("assign_permissions")?;
        state.check_permission_ids(permission_ids)?;
        let role = state.role_mut(id)?;
        let mut seen = HashSet::new();
        role.permissions = permission_ids
            .iter()
            .filter(|pid| seen.insert((*pid).clone()))
            .cloned()
            .map(PermissionRef::Reference)
            .collect();
        let stored = role.clone();
        Ok(state.populated(&stored))
    }

    fn delete_role(&self, id: &RoleId) -> Result<()> {
        let mut state = self.begin("delete_role")?;
        state.role_mut(id)?;
        if state.in_use.contains(id) {
            return Err(Error::operation(
                "delete_role",
                "status 400 Bad Request: role is assigned to users",
            ));
        }
        state.roles.retain(|r| &r.id != id);
        Ok(())
    }
}
