//! Role administration.
//!
//! A small state machine over the registry for one admin screen:
//!
//! ```text
//! Viewing ──begin_edit──▶ Editing(selected) ──save──▶ Saving ──▶ Viewing
//!    │                        ▲                          │
//!    │                        └────────── failure ───────┘
//!    ├──begin_create──▶ Creating(draft) ──save──▶ Saving ──▶ Viewing
//!    └──request_delete──▶ ConfirmingDelete ──confirm_delete──▶ Viewing
//! ```
//!
//! Toggling permissions only touches the in-memory selection. Saving sends
//! the complete target set in one call (replace, never merge), then reloads
//! the role and permission lists and refreshes the acting session so its
//! own gates reflect the change.

use crate::models::{
    Action, NewRole, Permission, PermissionId, Resource, Role, RoleId, RoleUpdate,
};
use crate::security::{AuditLogger, AuditOutcome};
use crate::services::{PermissionFilter, PermissionSession, RegistryClient};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A role being created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDraft {
    /// Role name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Whether the role is active.
    pub is_active: bool,
    /// Whether the role becomes the scope's default.
    pub is_default: bool,
    /// Selected permissions.
    pub permission_ids: BTreeSet<PermissionId>,
}

impl Default for RoleDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            is_active: true,
            is_default: false,
            permission_ids: BTreeSet::new(),
        }
    }
}

/// Where the editor is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorState {
    /// Browsing the role list.
    Viewing,
    /// Editing an existing role's permission selection.
    Editing {
        /// The role being edited.
        role_id: RoleId,
        /// The role's permissions when editing began.
        original: BTreeSet<PermissionId>,
        /// The target permission set.
        selected: BTreeSet<PermissionId>,
    },
    /// Building a new role.
    Creating {
        /// The role being built.
        draft: RoleDraft,
    },
    /// A save is in progress.
    Saving,
    /// Waiting for the user to confirm a deletion.
    ConfirmingDelete {
        /// The role to delete.
        role_id: RoleId,
    },
}

impl EditorState {
    /// Returns a short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Viewing => "viewing",
            Self::Editing { .. } => "editing",
            Self::Creating { .. } => "creating",
            Self::Saving => "saving",
            Self::ConfirmingDelete { .. } => "confirming_delete",
        }
    }
}

/// Selectable permissions for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGroup<'a> {
    /// The resource.
    pub resource: Resource,
    /// Active permissions on it, in action order.
    pub permissions: Vec<&'a Permission>,
}

/// Role administration screen state.
pub struct RoleAdministration {
    session: Arc<PermissionSession>,
    registry: Arc<dyn RegistryClient>,
    audit: Arc<AuditLogger>,
    company_id: Option<String>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    state: EditorState,
    last_error: Option<String>,
}

impl std::fmt::Debug for RoleAdministration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleAdministration")
            .field("company_id", &self.company_id)
            .field("roles", &self.roles.len())
            .field("permissions", &self.permissions.len())
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl RoleAdministration {
    /// Creates an editor acting as the session's principal.
    #[must_use]
    pub fn new(session: Arc<PermissionSession>, audit: Arc<AuditLogger>) -> Self {
        let registry = Arc::clone(session.registry());
        Self {
            session,
            registry,
            audit,
            company_id: None,
            roles: Vec::new(),
            permissions: Vec::new(),
            state: EditorState::Viewing,
            last_error: None,
        }
    }

    /// Restricts the role list to one company scope.
    #[must_use]
    pub fn with_company(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> &EditorState {
        &self.state
    }

    /// Returns the loaded roles, permissions as references.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Returns the loaded permission catalogue.
    #[must_use]
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Returns the last failure shown to the user.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the working permission selection while editing or creating.
    #[must_use]
    pub const fn selected(&self) -> Option<&BTreeSet<PermissionId>> {
        match &self.state {
            EditorState::Editing { selected, .. } => Some(selected),
            EditorState::Creating { draft } => Some(&draft.permission_ids),
            _ => None,
        }
    }

    /// Returns the draft while creating.
    pub const fn draft_mut(&mut self) -> Option<&mut RoleDraft> {
        match &mut self.state {
            EditorState::Creating { draft } => Some(draft),
            _ => None,
        }
    }

    /// Finds a loaded role.
    #[must_use]
    pub fn role(&self, id: &RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| &r.id == id)
    }

    /// Groups the active catalogue by resource for selection.
    #[must_use]
    pub fn permission_groups(&self) -> Vec<PermissionGroup<'_>> {
        Resource::all()
            .iter()
            .filter_map(|resource| {
                let mut permissions: Vec<&Permission> = self
                    .permissions
                    .iter()
                    .filter(|p| p.is_active && p.resource == *resource)
                    .collect();
                if permissions.is_empty() {
                    return None;
                }
                permissions.sort_by_key(|p| p.action);
                Some(PermissionGroup {
                    resource: *resource,
                    permissions,
                })
            })
            .collect()
    }

    fn actor(&self) -> String {
        self.session
            .principal()
            .map_or_else(|| "anonymous".to_string(), |p| p.id)
    }

    fn require_viewing(&self, transition: &str) -> Result<()> {
        if self.state == EditorState::Viewing {
            return Ok(());
        }
        Err(Error::InvalidState(format!(
            "cannot {transition} while {}",
            self.state.label()
        )))
    }

    /// Reloads roles and permissions from the registry.
    ///
    /// On failure the previous lists are kept and the error is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] without `role.read`, or the
    /// registry error.
    pub fn reload(&mut self) -> Result<()> {
        self.session.require(Resource::Role, Action::Read)?;
        let fetched = self
            .registry
            .list_roles(self.company_id.as_deref())
            .and_then(|roles| {
                let permissions = self.registry.list_permissions(&PermissionFilter::all())?;
                Ok((roles, permissions))
            });
        match fetched {
            Ok((mut roles, permissions)) => {
                for role in &mut roles {
                    role.normalize_to_references();
                }
                tracing::debug!(
                    roles = roles.len(),
                    permissions = permissions.len(),
                    "Role lists reloaded"
                );
                self.roles = roles;
                self.permissions = permissions;
                Ok(())
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reload role lists; keeping previous");
                self.last_error = Some(e.to_string());
                Err(e)
            },
        }
    }

    /// Starts editing a role's permissions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless viewing,
    /// [`Error::PermissionDenied`] without `role.update`, or
    /// [`Error::NotFound`] for an unknown role.
    pub fn begin_edit(&mut self, role_id: &RoleId) -> Result<()> {
        self.require_viewing("begin editing")?;
        self.session.require(Resource::Role, Action::Update)?;
        let role = self
            .role(role_id)
            .ok_or_else(|| Error::NotFound(format!("role {role_id}")))?;
        let original = role.permission_ids();
        self.state = EditorState::Editing {
            role_id: role_id.clone(),
            selected: original.clone(),
            original,
        };
        self.last_error = None;
        Ok(())
    }

    /// Starts creating a role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless viewing, or
    /// [`Error::PermissionDenied`] without `role.create`.
    pub fn begin_create(&mut self) -> Result<()> {
        self.require_viewing("begin creating")?;
        self.session.require(Resource::Role, Action::Create)?;
        self.state = EditorState::Creating {
            draft: RoleDraft::default(),
        };
        self.last_error = None;
        Ok(())
    }

    /// Toggles one permission in the working selection, returning whether
    /// it is now selected. No network call is made.
    ///
    /// Permissions not already selected must be active catalogue entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless editing or creating, or
    /// [`Error::InvalidInput`] for an unknown or inactive permission.
    pub fn toggle_permission(&mut self, id: &PermissionId) -> Result<bool> {
        let selectable = self
            .permissions
            .iter()
            .any(|p| &p.id == id && p.is_active);
        let selected = match &mut self.state {
            EditorState::Editing { selected, .. } => selected,
            EditorState::Creating { draft } => &mut draft.permission_ids,
            other => {
                return Err(Error::InvalidState(format!(
                    "cannot toggle permissions while {}",
                    other.label()
                )));
            },
        };
        if selected.remove(id) {
            return Ok(false);
        }
        if !selectable {
            return Err(Error::InvalidInput(format!(
                "permission {id} is not selectable"
            )));
        }
        selected.insert(id.clone());
        Ok(true)
    }

    /// Returns to viewing, discarding any unsaved selection or draft.
    pub fn cancel(&mut self) {
        if self.state != EditorState::Saving {
            self.state = EditorState::Viewing;
        }
    }

    /// Saves the current edit or draft.
    ///
    /// Edits are sent as one replace-semantics assignment. After a
    /// successful save the lists are reloaded and the acting session is
    /// refreshed. On failure the editor returns to the state it was saving
    /// from, selection intact, with the error recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless editing or creating,
    /// [`Error::PermissionDenied`] without the needed permission, or the
    /// registry error.
    pub fn save(&mut self) -> Result<Role> {
        let (operation, resume) = match &self.state {
            EditorState::Editing { .. } => {
                self.session.require(Resource::Role, Action::Update)?;
                ("assign_permissions", self.state.clone())
            },
            EditorState::Creating { draft } => {
                self.session.require(Resource::Role, Action::Create)?;
                let request = Self::new_role_request(draft, self.company_id.clone());
                if let Err(e) = request.validate() {
                    self.last_error = Some(e.to_string());
                    return Err(e);
                }
                ("create", self.state.clone())
            },
            other => {
                return Err(Error::InvalidState(format!(
                    "nothing to save while {}",
                    other.label()
                )));
            },
        };

        tracing::debug!(operation, "Saving role");
        self.state = EditorState::Saving;
        let result = match &resume {
            EditorState::Editing {
                role_id, selected, ..
            } => {
                let ids: Vec<PermissionId> = selected.iter().cloned().collect();
                self.registry.assign_permissions(role_id, &ids)
            },
            EditorState::Creating { draft } => self
                .registry
                .create_role(&Self::new_role_request(draft, self.company_id.clone())),
            _ => Err(Error::InvalidState("unexpected save state".to_string())),
        };

        match result {
            Ok(role) => {
                self.record_mutation(operation, Some(&role.id), AuditOutcome::Success, None);
                self.after_mutation();
                Ok(role)
            },
            Err(e) => {
                let role_id = match &resume {
                    EditorState::Editing { role_id, .. } => Some(role_id.clone()),
                    _ => None,
                };
                self.record_mutation(operation, role_id.as_ref(), AuditOutcome::Failure, Some(&e));
                self.last_error = Some(e.to_string());
                self.state = resume;
                Err(e)
            },
        }
    }

    fn new_role_request(draft: &RoleDraft, company_id: Option<String>) -> NewRole {
        NewRole {
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            permission_ids: draft.permission_ids.iter().cloned().collect(),
            is_active: draft.is_active,
            is_default: draft.is_default,
            company_id,
        }
    }

    /// Updates a role's name, description and flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] while saving,
    /// [`Error::PermissionDenied`] without `role.update`,
    /// [`Error::InvalidInput`] for an empty update or blank name, or the
    /// registry error.
    pub fn update_details(&mut self, role_id: &RoleId, update: &RoleUpdate) -> Result<Role> {
        if self.state == EditorState::Saving {
            return Err(Error::InvalidState("cannot update while saving".to_string()));
        }
        self.session.require(Resource::Role, Action::Update)?;
        if update.is_empty() {
            return Err(Error::InvalidInput("nothing to update".to_string()));
        }
        update.validate()?;

        match self.registry.update_role(role_id, update) {
            Ok(role) => {
                self.record_mutation("update", Some(role_id), AuditOutcome::Success, None);
                self.after_mutation();
                Ok(role)
            },
            Err(e) => {
                self.record_mutation("update", Some(role_id), AuditOutcome::Failure, Some(&e));
                self.last_error = Some(e.to_string());
                Err(e)
            },
        }
    }

    /// Asks to delete a role; [`confirm_delete`](Self::confirm_delete) performs it.
    ///
    /// The reserved admin role is refused here, before any network call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless viewing, [`Error::NotFound`]
    /// for an unknown role, [`Error::ProtectedRole`] for the admin role, or
    /// [`Error::PermissionDenied`] without `role.delete`.
    pub fn request_delete(&mut self, role_id: &RoleId) -> Result<()> {
        self.require_viewing("request deletion")?;
        let role = self
            .role(role_id)
            .ok_or_else(|| Error::NotFound(format!("role {role_id}")))?;
        if role.is_reserved_admin() {
            let err = Error::ProtectedRole {
                name: role.name.clone(),
            };
            self.audit
                .log_denied(&self.actor(), "role.delete", "protected role");
            metrics::counter!(
                "authz_role_mutations_total",
                "operation" => "delete",
                "status" => "denied"
            )
            .increment(1);
            tracing::warn!(role = %role_id, "Refused to delete protected role");
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        self.session.require(Resource::Role, Action::Delete)?;
        self.state = EditorState::ConfirmingDelete {
            role_id: role_id.clone(),
        };
        self.last_error = None;
        Ok(())
    }

    /// Performs the deletion awaiting confirmation.
    ///
    /// A registry refusal (for example, the role is still assigned to
    /// users) is recorded as the visible error and the editor returns to
    /// viewing with the role intact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless confirming a deletion, or the
    /// registry error.
    pub fn confirm_delete(&mut self) -> Result<()> {
        let EditorState::ConfirmingDelete { role_id } = &self.state else {
            return Err(Error::InvalidState(format!(
                "no deletion to confirm while {}",
                self.state.label()
            )));
        };
        let role_id = role_id.clone();
        self.session.require(Resource::Role, Action::Delete)?;
        self.state = EditorState::Saving;

        match self.registry.delete_role(&role_id) {
            Ok(()) => {
                self.record_mutation("delete", Some(&role_id), AuditOutcome::Success, None);
                self.after_mutation();
                Ok(())
            },
            Err(e) => {
                self.record_mutation("delete", Some(&role_id), AuditOutcome::Failure, Some(&e));
                self.last_error = Some(e.to_string());
                self.state = EditorState::Viewing;
                Err(e)
            },
        }
    }

    /// Abandons a pending deletion.
    pub fn cancel_delete(&mut self) {
        if matches!(self.state, EditorState::ConfirmingDelete { .. }) {
            self.state = EditorState::Viewing;
        }
    }

    // Reload strictly after the mutation resolved, then refresh the actor's grants.
    fn after_mutation(&mut self) {
        self.state = EditorState::Viewing;
        self.last_error = None;
        if let Err(e) = self.reload() {
            tracing::warn!(error = %e, "Role saved but lists could not be reloaded");
        }
        if let Err(e) = self.session.refresh() {
            tracing::warn!(error = %e, "Role saved but session grants could not be refreshed");
            self.last_error = Some(format!("your permissions could not be refreshed: {e}"));
        }
    }

    fn record_mutation(
        &self,
        operation: &'static str,
        role_id: Option<&RoleId>,
        outcome: AuditOutcome,
        error: Option<&Error>,
    ) {
        let status = match outcome {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "error",
            AuditOutcome::Denied => "denied",
        };
        metrics::counter!(
            "authz_role_mutations_total",
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        let metadata = error.map_or(serde_json::Value::Null, |e| {
            serde_json::json!({ "error": e.to_string() })
        });
        self.audit.log_role_mutation(
            &self.actor(),
            operation,
            role_id.map(RoleId::as_str),
            outcome,
            metadata,
        );
        if let Some(e) = error {
            tracing::warn!(operation, role = ?role_id.map(RoleId::as_str), error = %e, "Role mutation failed");
        } else {
            tracing::info!(operation, role = ?role_id.map(RoleId::as_str), "Role mutation applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GrantedPermissionSet, Principal};
    use crate::security::AuditConfig;
    use crate::services::InMemoryRegistry;
    use crate::storage::MemoryGrantStore;

    struct Fixture {
        registry: Arc<InMemoryRegistry>,
        audit: Arc<AuditLogger>,
        admin: RoleAdministration,
    }

    fn fixture(grants: &[&str]) -> Fixture {
        let registry = Arc::new(InMemoryRegistry::with_full_catalogue());
        registry.set_granted(GrantedPermissionSet::from_names(grants.iter().copied()));
        let session = Arc::new(PermissionSession::new(
            registry.clone(),
            Arc::new(MemoryGrantStore::new()),
        ));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();
        let audit = Arc::new(AuditLogger::with_config(AuditConfig::default().without_tracing()));
        let admin = RoleAdministration::new(session, audit.clone());
        Fixture {
            registry,
            audit,
            admin,
        }
    }

    fn seed_role(registry: &InMemoryRegistry, name: &str, ids: &[&str]) -> RoleId {
        registry
            .create_role(&NewRole {
                name: name.to_string(),
                description: String::new(),
                permission_ids: ids.iter().map(|id| PermissionId::new(*id)).collect(),
                is_active: true,
                is_default: false,
                company_id: None,
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_reload_normalizes_to_references() {
        let mut f = fixture(&["role.manage"]);
        seed_role(&f.registry, "Editor", &["content.read"]);
        f.admin.reload().unwrap();
        assert_eq!(f.admin.roles().len(), 1);
        assert!(f.admin.roles()[0]
            .permissions
            .iter()
            .all(|p| p.as_populated().is_none()));
        assert_eq!(f.admin.permissions().len(), 40);
    }

    #[test]
    fn test_reload_requires_read() {
        let mut f = fixture(&["content.read"]);
        assert!(matches!(
            f.admin.reload(),
            Err(Error::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_reload_failure_keeps_lists() {
        let mut f = fixture(&["role.manage"]);
        seed_role(&f.registry, "Editor", &[]);
        f.admin.reload().unwrap();
        f.registry
            .set_failure(Some(crate::services::InjectedFailure::Offline));
        assert!(f.admin.reload().is_err());
        assert_eq!(f.admin.roles().len(), 1);
        assert!(f.admin.last_error().is_some());
    }

    #[test]
    fn test_toggle_without_network() {
        let mut f = fixture(&["role.manage"]);
        let id = seed_role(&f.registry, "Editor", &["content.read"]);
        f.admin.reload().unwrap();
        f.admin.begin_edit(&id).unwrap();
        let before = f.registry.request_count();

        assert!(f.admin.toggle_permission(&PermissionId::new("content.update")).unwrap());
        assert!(!f.admin.toggle_permission(&PermissionId::new("content.read")).unwrap());
        assert_eq!(f.registry.request_count(), before);
        assert_eq!(
            f.admin.selected().unwrap().iter().map(PermissionId::as_str).collect::<Vec<_>>(),
            vec!["content.update"]
        );
    }

    #[test]
    fn test_toggle_rejects_inactive_permission() {
        let mut f = fixture(&["role.manage"]);
        let mut retired = Permission::new("legacy", Resource::Content, Action::Read);
        retired.is_active = false;
        f.registry.add_permission(retired);
        let id = seed_role(&f.registry, "Editor", &[]);
        f.admin.reload().unwrap();
        f.admin.begin_edit(&id).unwrap();
        assert!(matches!(
            f.admin.toggle_permission(&PermissionId::new("legacy")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_toggle_outside_edit_is_invalid_state() {
        let mut f = fixture(&["role.manage"]);
        assert!(matches!(
            f.admin.toggle_permission(&PermissionId::new("content.read")),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_save_replaces_and_returns_to_viewing() {
        let mut f = fixture(&["role.manage"]);
        let id = seed_role(&f.registry, "Editor", &["content.read", "content.update"]);
        f.admin.reload().unwrap();
        f.admin.begin_edit(&id).unwrap();
        f.admin.toggle_permission(&PermissionId::new("content.read")).unwrap();
        f.admin.save().unwrap();

        assert_eq!(f.admin.state(), &EditorState::Viewing);
        let stored = f.registry.stored_role(&id).unwrap();
        assert_eq!(
            stored.permission_ids().into_iter().collect::<Vec<_>>(),
            vec![PermissionId::new("content.update")]
        );
        let reloaded = f.admin.role(&id).unwrap();
        assert!(!reloaded.has_permission_id(&PermissionId::new("content.read")));
        assert_eq!(f.audit.recent_entries(1)[0].event_type, "role.assign_permissions");
    }

    #[test]
    fn test_save_failure_returns_to_editing() {
        let mut f = fixture(&["role.manage"]);
        let id = seed_role(&f.registry, "Editor", &["content.read"]);
        f.admin.reload().unwrap();
        f.admin.begin_edit(&id).unwrap();
        f.admin.toggle_permission(&PermissionId::new("user.read")).unwrap();

        f.registry
            .set_failure(Some(crate::services::InjectedFailure::Offline));
        assert!(f.admin.save().is_err());
        assert!(matches!(f.admin.state(), EditorState::Editing { .. }));
        assert!(f.admin.selected().unwrap().contains(&PermissionId::new("user.read")));
        assert!(f.admin.last_error().is_some());
        assert_eq!(f.audit.recent_entries(1)[0].outcome, AuditOutcome::Failure);

        f.registry.set_failure(None);
        f.admin.save().unwrap();
        assert!(f.registry.stored_role(&id).unwrap().has_permission_id(&PermissionId::new("user.read")));
    }

    #[test]
    fn test_create_flow() {
        let mut f = fixture(&["role.manage"]);
        f.admin.reload().unwrap();
        f.admin.begin_create().unwrap();
        let draft = f.admin.draft_mut().unwrap();
        draft.name = "  Reviewer ".to_string();
        f.admin.toggle_permission(&PermissionId::new("content.read")).unwrap();
        let role = f.admin.save().unwrap();

        assert_eq!(role.name, "Reviewer");
        assert_eq!(f.admin.state(), &EditorState::Viewing);
        assert_eq!(f.admin.roles().len(), 1);
    }

    #[test]
    fn test_create_blank_name_stays_creating() {
        let mut f = fixture(&["role.manage"]);
        f.admin.begin_create().unwrap();
        let before = f.registry.request_count();
        assert!(matches!(f.admin.save(), Err(Error::InvalidInput(_))));
        assert!(matches!(f.admin.state(), EditorState::Creating { .. }));
        assert_eq!(f.registry.request_count(), before);
    }

    #[test]
    fn test_create_requires_create_permission() {
        let mut f = fixture(&["role.read", "role.update"]);
        assert!(matches!(
            f.admin.begin_create(),
            Err(Error::PermissionDenied { ref permission }) if permission == "role.create"
        ));
    }

    #[test]
    fn test_begin_edit_requires_viewing() {
        let mut f = fixture(&["role.manage"]);
        let id = seed_role(&f.registry, "Editor", &[]);
        f.admin.reload().unwrap();
        f.admin.begin_edit(&id).unwrap();
        assert!(matches!(f.admin.begin_create(), Err(Error::InvalidState(_))));
        f.admin.cancel();
        assert!(f.admin.begin_create().is_ok());
    }

    #[test]
    fn test_delete_admin_rejected_without_network() {
        let mut f = fixture(&["role.manage"]);
        let id = seed_role(&f.registry, " ADMIN ", &[]);
        f.admin.reload().unwrap();
        let before = f.registry.request_count();

        assert!(matches!(
            f.admin.request_delete(&id),
            Err(Error::ProtectedRole { .. })
        ));
        assert_eq!(f.registry.request_count(), before);
        assert_eq!(f.admin.state(), &EditorState::Viewing);
        assert_eq!(f.audit.recent_entries(1)[0].outcome, AuditOutcome::Denied);
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let mut f = fixture(&["role.manage"]);
        let id = seed_role(&f.registry, "Temp", &[]);
        f.admin.reload().unwrap();

        f.admin.request_delete(&id).unwrap();
        assert!(f.registry.stored_role(&id).is_some());
        f.admin.cancel_delete();
        assert_eq!(f.admin.state(), &EditorState::Viewing);

        f.admin.request_delete(&id).unwrap();
        f.admin.confirm_delete().unwrap();
        assert!(f.registry.stored_role(&id).is_none());
        assert!(f.admin.role(&id).is_none());
    }

    #[test]
    fn test_delete_in_use_surfaces_error() {
        let mut f = fixture(&["role.manage"]);
        let id = seed_role(&f.registry, "Busy", &[]);
        f.registry.mark_in_use(id.clone());
        f.admin.reload().unwrap();

        f.admin.request_delete(&id).unwrap();
        assert!(f.admin.confirm_delete().is_err());
        assert!(f.admin.last_error().unwrap().contains("assigned to users"));
        assert_eq!(f.admin.state(), &EditorState::Viewing);
        assert!(f.admin.role(&id).is_some());
    }

    #[test]
    fn test_confirm_without_request_is_invalid_state() {
        let mut f = fixture(&["role.manage"]);
        assert!(matches!(f.admin.confirm_delete(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_update_details() {
        let mut f = fixture(&["role.read", "role.update"]);
        let id = seed_role(&f.registry, "Editor", &[]);
        f.admin.reload().unwrap();
        let role = f
            .admin
            .update_details(
                &id,
                &RoleUpdate {
                    description: Some("Edits content".to_string()),
                    is_default: Some(true),
                    ..RoleUpdate::default()
                },
            )
            .unwrap();
        assert!(role.is_default);
        assert_eq!(f.admin.role(&id).unwrap().description, "Edits content");
        assert!(matches!(
            f.admin.update_details(&id, &RoleUpdate::default()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_permission_groups_order_and_filter() {
        let mut f = fixture(&["role.manage"]);
        let mut retired = Permission::new("legacy", Resource::Content, Action::Read);
        retired.is_active = false;
        f.registry.add_permission(retired);
        f.admin.reload().unwrap();

        let groups = f.admin.permission_groups();
        assert_eq!(groups.len(), Resource::all().len());
        assert_eq!(groups[0].resource, Resource::all()[0]);
        assert_eq!(groups[0].permissions.len(), Action::all().len());
        assert_eq!(groups[0].permissions[0].action, Action::all()[0]);
    }

    #[test]
    fn test_save_refreshes_acting_session() {
        let registry = Arc::new(InMemoryRegistry::with_full_catalogue());
        let own = seed_role(&registry, "Own", &["role.manage"]);
        registry.set_current_role(own.clone());
        let session = Arc::new(PermissionSession::new(
            registry.clone(),
            Arc::new(MemoryGrantStore::new()),
        ));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();
        let mut admin = RoleAdministration::new(session.clone(), Arc::new(AuditLogger::new()));

        admin.reload().unwrap();
        admin.begin_edit(&own).unwrap();
        admin.toggle_permission(&PermissionId::new("analytics.read")).unwrap();
        admin.save().unwrap();

        assert!(session.has_permission(Resource::Analytics, Action::Read));
    }

    /// Delegates to the in-memory registry but can fail grant fetches alone.
    struct FlakyGrants {
        inner: Arc<InMemoryRegistry>,
        fail_grants: std::sync::atomic::AtomicBool,
    }

    impl RegistryClient for FlakyGrants {
        fn fetch_granted_permissions(&self) -> Result<GrantedPermissionSet> {
            if self.fail_grants.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::operation("fetch_granted_permissions", "connect error"));
            }
            self.inner.fetch_granted_permissions()
        }
        fn list_permissions(&self, filter: &PermissionFilter) -> Result<Vec<Permission>> {
            self.inner.list_permissions(filter)
        }
        fn list_roles(&self, company_id: Option<&str>) -> Result<Vec<Role>> {
            self.inner.list_roles(company_id)
        }
        fn create_role(&self, role: &NewRole) -> Result<Role> {
            self.inner.create_role(role)
        }
        fn update_role(&self, id: &RoleId, update: &RoleUpdate) -> Result<Role> {
            self.inner.update_role(id, update)
        }
        fn assign_permissions(&self, id: &RoleId, permission_ids: &[PermissionId]) -> Result<Role> {
            self.inner.assign_permissions(id, permission_ids)
        }
        fn delete_role(&self, id: &RoleId) -> Result<()> {
            self.inner.delete_role(id)
        }
    }

    #[test]
    fn test_failed_grant_refresh_after_save_is_surfaced() {
        let inner = Arc::new(InMemoryRegistry::with_full_catalogue());
        inner.set_granted(GrantedPermissionSet::from_names(["role.manage"]));
        let editor = seed_role(&inner, "Editor", &["content.read"]);
        let registry = Arc::new(FlakyGrants {
            inner: inner.clone(),
            fail_grants: std::sync::atomic::AtomicBool::new(false),
        });
        let session = Arc::new(PermissionSession::new(
            registry.clone(),
            Arc::new(MemoryGrantStore::new()),
        ));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();
        let mut admin = RoleAdministration::new(session, Arc::new(AuditLogger::new()));
        admin.reload().unwrap();

        admin.begin_edit(&editor).unwrap();
        admin.toggle_permission(&PermissionId::new("content.update")).unwrap();
        registry
            .fail_grants
            .store(true, std::sync::atomic::Ordering::SeqCst);
        admin.save().unwrap();

        assert_eq!(admin.state(), &EditorState::Viewing);
        assert!(admin.last_error().unwrap().contains("permissions could not be refreshed"));
        assert_eq!(inner.stored_role(&editor).unwrap().permission_ids().len(), 2);
    }
}
