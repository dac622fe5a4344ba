//! Session-scoped permission cache.
//!
//! A [`PermissionSession`] owns one principal's granted permissions for the
//! life of a login. It is created per session and passed to whatever needs
//! a decision; there is no process-wide cache.
//!
//! # Lifecycle
//!
//! | Call | Effect |
//! |------|--------|
//! | [`init`](PermissionSession::init) | binds the principal; a different account clears the cache first |
//! | [`load`](PermissionSession::load) | reads the persisted set, never touches the network, ends loading |
//! | [`refresh`](PermissionSession::refresh) | fetches the live set for company users, persists then swaps |
//! | [`clear`](PermissionSession::clear) | empties memory and storage, invalidates in-flight refreshes |
//! | [`teardown`](PermissionSession::teardown) | clear and unbind the principal (logout) |
//!
//! # Overlapping refreshes
//!
//! Every refresh takes a ticket from a monotonic counter before it goes to
//! the network. A response is applied only if its ticket is newer than the
//! last one applied, so a slow response can never overwrite a newer one.
//! `clear` raises the floor to the latest issued ticket, so a response that
//! resolves after logout is dropped. `clear` also bumps an epoch that `load`
//! checks before applying what it read from storage.

use crate::models::{Action, GrantedPermissionSet, Principal, Resource};
use crate::security::{AccessResult, AuditLogger, check_access, has_any_permission};
use crate::services::RegistryClient;
use crate::storage::GrantStore;
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::instrument;

/// Default storage key for the persisted grant set.
pub const DEFAULT_GRANTS_KEY: &str = "user_permissions";

/// A consistent view of the session for one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSnapshot {
    /// The signed-in principal.
    pub principal: Option<Principal>,
    /// Granted permissions; empty while loading.
    pub grants: GrantedPermissionSet,
    /// True until local state has been established.
    pub is_loading: bool,
    /// True while at least one refresh is in flight.
    pub is_refreshing: bool,
    /// The last refresh failure, kept until the next success.
    pub last_error: Option<String>,
}

impl PermissionSnapshot {
    /// A settled snapshot.
    #[must_use]
    pub const fn ready(principal: Option<Principal>, grants: GrantedPermissionSet) -> Self {
        Self {
            principal,
            grants,
            is_loading: false,
            is_refreshing: false,
            last_error: None,
        }
    }

    /// A snapshot whose grants are not yet known.
    #[must_use]
    pub const fn loading(principal: Option<Principal>) -> Self {
        Self {
            principal,
            grants: GrantedPermissionSet::empty(),
            is_loading: true,
            is_refreshing: false,
            last_error: None,
        }
    }

    /// Decides `resource.action` against this snapshot.
    #[must_use]
    pub fn has_permission(&self, resource: Resource, action: Action) -> bool {
        check_access(resource, action, self.principal.as_ref(), &self.grants).is_granted()
    }

    /// Returns true if any of `checks` is allowed.
    #[must_use]
    pub fn has_any_permission(&self, checks: &[(Resource, Action)]) -> bool {
        has_any_permission(checks, self.principal.as_ref(), &self.grants)
    }
}

/// What a call to [`PermissionSession::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched set replaced the cache.
    Applied {
        /// Number of grants now cached.
        count: usize,
    },
    /// No fetch was needed for this principal.
    Skipped,
    /// The response arrived after a newer refresh or a clear and was dropped.
    Discarded,
}

impl RefreshOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Skipped => "skipped",
            Self::Discarded => "discarded",
        }
    }
}

#[derive(Debug)]
struct SessionState {
    principal: Option<Principal>,
    grants: GrantedPermissionSet,
    is_loading: bool,
    in_flight: usize,
    // Tickets at or below this value are never applied.
    floor: u64,
    // Bumped by every clear.
    epoch: u64,
    last_error: Option<String>,
}

impl SessionState {
    const fn new() -> Self {
        Self {
            principal: None,
            grants: GrantedPermissionSet::empty(),
            is_loading: true,
            in_flight: 0,
            floor: 0,
            epoch: 0,
            last_error: None,
        }
    }
}

/// Permission cache for one signed-in principal.
pub struct PermissionSession {
    registry: Arc<dyn RegistryClient>,
    store: Arc<dyn GrantStore>,
    storage_key: String,
    audit: Option<Arc<AuditLogger>>,
    tickets: AtomicU64,
    state: RwLock<SessionState>,
}

impl std::fmt::Debug for PermissionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionSession")
            .field("storage_key", &self.storage_key)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PermissionSession {
    /// Creates an uninitialized session.
    #[must_use]
    pub fn new(registry: Arc<dyn RegistryClient>, store: Arc<dyn GrantStore>) -> Self {
        Self {
            registry,
            store,
            storage_key: DEFAULT_GRANTS_KEY.to_string(),
            audit: None,
            tickets: AtomicU64::new(0),
            state: RwLock::new(SessionState::new()),
        }
    }

    /// Sets the storage key for the persisted grant set.
    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Sets the audit logger for lifecycle events.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Returns the registry this session fetches from.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn RegistryClient> {
        &self.registry
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Binds `principal` to the session.
    ///
    /// If a different account was bound, its grants are cleared from memory
    /// and storage first.
    ///
    /// # Errors
    ///
    /// Returns an error if stale persisted grants cannot be removed.
    pub fn init(&self, principal: Principal) -> Result<()> {
        let mut state = self.write();
        let switching = state
            .principal
            .as_ref()
            .is_some_and(|current| !current.same_account(&principal));
        if switching {
            tracing::info!(principal = %principal.id, "Principal changed; clearing cached grants");
            self.clear_locked(&mut state)?;
        }
        tracing::info!(
            principal = %principal.id,
            user_type = principal.user_type.as_str(),
            "Permission session initialized"
        );
        state.principal = Some(principal);
        Ok(())
    }

    /// Establishes local state from the persisted grant set.
    ///
    /// Never touches the network. Missing or unreadable persisted state
    /// yields an empty set; either way loading ends. Returns the number of
    /// grants now cached.
    ///
    /// A read that overlaps a [`clear`](Self::clear) is dropped and leaves the
    /// cleared state untouched.
    pub fn load(&self) -> usize {
        let epoch = self.read().epoch;
        let persisted = match self.store.load(&self.storage_key) {
            Ok(grants) => grants,
            Err(e) => {
                tracing::warn!(key = %self.storage_key, error = %e, "Ignoring unreadable persisted grants");
                None
            },
        };
        let mut state = self.write();
        if state.epoch != epoch {
            tracing::debug!(epoch, current = state.epoch, "Discarding persisted grants read across a clear");
            return state.grants.len();
        }
        if let Some(grants) = persisted {
            state.grants = grants;
        }
        state.is_loading = false;
        tracing::debug!(count = state.grants.len(), "Permission session loaded");
        state.grants.len()
    }

    /// Fetches the live grant set from the registry.
    ///
    /// Only company users are fetched for; admins and regular users return
    /// [`RefreshOutcome::Skipped`] without a network call. On success the
    /// persisted copy is written before the in-memory set is swapped, so the
    /// two never diverge. On failure the previous set is kept.
    ///
    /// # Errors
    ///
    /// Returns the registry or storage error. [`Error::Unauthorized`] also
    /// tears the session down.
    #[instrument(skip(self), fields(operation = "session.refresh"))]
    pub fn refresh(&self) -> Result<RefreshOutcome> {
        let start = Instant::now();
        let result = self.refresh_inner();

        let status = match &result {
            Ok(outcome) => outcome.label(),
            Err(Error::Unauthorized(_)) => "unauthorized",
            Err(_) => "error",
        };
        metrics::counter!("authz_refresh_total", "status" => status).increment(1);
        metrics::histogram!("authz_refresh_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        result
    }

    fn refresh_inner(&self) -> Result<RefreshOutcome> {
        let (principal_id, ticket) = {
            let mut state = self.write();
            let Some(id) = state
                .principal
                .as_ref()
                .filter(|p| p.user_type.uses_grants())
                .map(|p| p.id.clone())
            else {
                return Ok(RefreshOutcome::Skipped);
            };
            state.in_flight += 1;
            (id, self.tickets.fetch_add(1, Ordering::SeqCst) + 1)
        };

        let fetched = self.registry.fetch_granted_permissions();

        let mut state = self.write();
        state.in_flight = state.in_flight.saturating_sub(1);

        let same_principal =
            state.principal.as_ref().map(|p| p.id.as_str()) == Some(principal_id.as_str());
        let stale = ticket <= state.floor || !same_principal;

        // A rejected credential is acted on even when a newer refresh already landed.
        let grants = match fetched {
            Ok(_) if stale => {
                tracing::debug!(ticket, floor = state.floor, "Discarding stale refresh response");
                return Ok(RefreshOutcome::Discarded);
            },
            Ok(grants) => grants,
            Err(Error::Unauthorized(message)) if same_principal => {
                drop(state);
                tracing::warn!(principal = %principal_id, "Registry rejected session; tearing down");
                if let Some(audit) = &self.audit {
                    audit.log_session(&principal_id, "teardown", "unauthorized");
                }
                self.teardown()?;
                return Err(Error::Unauthorized(message));
            },
            Err(e) if stale => {
                tracing::debug!(ticket, floor = state.floor, error = %e, "Stale refresh failed");
                return Err(e);
            },
            Err(e) => {
                tracing::warn!(principal = %principal_id, error = %e, "Grant refresh failed; keeping previous set");
                state.last_error = Some(e.to_string());
                return Err(e);
            },
        };

        if let Err(e) = self.store.save(&self.storage_key, &grants) {
            tracing::warn!(error = %e, "Failed to persist grants; keeping previous set");
            state.last_error = Some(e.to_string());
            return Err(e);
        }

        let count = grants.len();
        state.grants = grants;
        state.floor = ticket;
        state.is_loading = false;
        state.last_error = None;
        tracing::info!(principal = %principal_id, count, "Grants refreshed");
        Ok(RefreshOutcome::Applied { count })
    }

    /// Empties the in-memory and persisted grant set.
    ///
    /// Refreshes already in flight are discarded when they resolve. The
    /// in-memory set is always emptied, even if storage fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted copy cannot be removed.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.write();
        self.clear_locked(&mut state)
    }

    fn clear_locked(&self, state: &mut SessionState) -> Result<()> {
        state.grants = GrantedPermissionSet::empty();
        state.floor = self.tickets.load(Ordering::SeqCst);
        state.epoch += 1;
        state.last_error = None;
        self.store.remove(&self.storage_key).map(|_| ())
    }

    /// Ends the session: clears the cache and unbinds the principal.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted copy cannot be removed.
    pub fn teardown(&self) -> Result<()> {
        let mut state = self.write();
        let result = self.clear_locked(&mut state);
        if let Some(principal) = state.principal.take() {
            tracing::info!(principal = %principal.id, "Permission session torn down");
        }
        state.is_loading = true;
        result
    }

    /// Returns a consistent copy of the session state.
    #[must_use]
    pub fn snapshot(&self) -> PermissionSnapshot {
        let state = self.read();
        PermissionSnapshot {
            principal: state.principal.clone(),
            grants: if state.is_loading {
                GrantedPermissionSet::empty()
            } else {
                state.grants.clone()
            },
            is_loading: state.is_loading,
            is_refreshing: state.in_flight > 0,
            last_error: state.last_error.clone(),
        }
    }

    /// Returns the bound principal.
    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.read().principal.clone()
    }

    /// Returns the cached grants; empty while loading.
    #[must_use]
    pub fn grants(&self) -> GrantedPermissionSet {
        self.snapshot().grants
    }

    /// Returns true until local state has been established.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    /// Decides `resource.action` for the bound principal and records the outcome.
    #[must_use]
    pub fn check(&self, resource: Resource, action: Action) -> AccessResult {
        let state = self.read();
        let empty = GrantedPermissionSet::empty();
        let grants = if state.is_loading { &empty } else { &state.grants };
        let result = check_access(resource, action, state.principal.as_ref(), grants);
        metrics::counter!("authz_decisions_total", "outcome" => result.label()).increment(1);
        tracing::trace!(
            resource = resource.as_str(),
            action = action.as_str(),
            outcome = result.label(),
            "Access decision"
        );
        result
    }

    /// Returns true if the bound principal may perform `action` on `resource`.
    #[must_use]
    pub fn has_permission(&self, resource: Resource, action: Action) -> bool {
        self.check(resource, action).is_granted()
    }

    /// Returns true if any of `checks` is allowed.
    #[must_use]
    pub fn has_any_permission(&self, checks: &[(Resource, Action)]) -> bool {
        checks.iter().any(|(r, a)| self.has_permission(*r, *a))
    }

    /// Fails with [`Error::PermissionDenied`] unless `resource.action` is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] naming the missing permission.
    pub fn require(&self, resource: Resource, action: Action) -> Result<()> {
        if self.has_permission(resource, action) {
            return Ok(());
        }
        let permission = crate::models::build_name(resource, action);
        let actor = self
            .principal()
            .map_or_else(|| "anonymous".to_string(), |p| p.id);
        tracing::warn!(permission = %permission, principal = %actor, "Operation refused");
        if let Some(audit) = &self.audit {
            audit.log_denied(&actor, &permission, "missing permission");
        }
        Err(Error::PermissionDenied { permission })
    }

    /// Fails with [`Error::PermissionDenied`] unless one of `checks` is allowed.
    ///
    /// The error names the first check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if none of `checks` is allowed.
    pub fn require_any(&self, checks: &[(Resource, Action)]) -> Result<()> {
        if self.has_any_permission(checks) {
            return Ok(());
        }
        match checks.first() {
            Some((resource, action)) => self.require(*resource, *action),
            None => Err(Error::InvalidInput("no permission checks given".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GrantedPermission, PermissionKey};
    use crate::services::{InMemoryRegistry, InjectedFailure};
    use crate::storage::MemoryGrantStore;

    fn setup() -> (Arc<InMemoryRegistry>, Arc<MemoryGrantStore>, PermissionSession) {
        let registry = Arc::new(InMemoryRegistry::with_full_catalogue());
        let store = Arc::new(MemoryGrantStore::new());
        let session = PermissionSession::new(registry.clone(), store.clone());
        (registry, store, session)
    }

    #[test]
    fn test_uninitialized_session_denies() {
        let (_, _, session) = setup();
        assert!(session.is_loading());
        assert!(!session.has_permission(Resource::Content, Action::Read));
        assert!(session.snapshot().grants.is_empty());
    }

    #[test]
    fn test_load_without_persisted_state() {
        let (_, _, session) = setup();
        session.init(Principal::company_user("u-1")).unwrap();
        assert_eq!(session.load(), 0);
        assert!(!session.is_loading());
    }

    #[test]
    fn test_load_restores_persisted_grants() {
        let (_, store, session) = setup();
        store
            .save(DEFAULT_GRANTS_KEY, &GrantedPermissionSet::from_names(["content.read"]))
            .unwrap();
        session.init(Principal::company_user("u-1")).unwrap();
        assert_eq!(session.load(), 1);
        assert!(session.has_permission(Resource::Content, Action::Read));
    }

    #[test]
    fn test_refresh_persists_and_swaps() {
        let (registry, store, session) = setup();
        registry.set_granted(GrantedPermissionSet::from_names(["role.manage"]));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();

        assert_eq!(session.refresh().unwrap(), RefreshOutcome::Applied { count: 1 });
        assert!(session.has_permission(Resource::Role, Action::Delete));
        assert_eq!(
            store.load(DEFAULT_GRANTS_KEY).unwrap().unwrap(),
            session.grants()
        );
    }

    #[test]
    fn test_refresh_skipped_for_admin_and_regular_user() {
        let (registry, _, session) = setup();
        session.init(Principal::admin("a-1")).unwrap();
        assert_eq!(session.refresh().unwrap(), RefreshOutcome::Skipped);
        session.teardown().unwrap();
        session.init(Principal::regular_user("r-1")).unwrap();
        assert_eq!(session.refresh().unwrap(), RefreshOutcome::Skipped);
        assert_eq!(registry.request_count(), 0);
    }

    #[test]
    fn test_refresh_failure_keeps_previous_set() {
        let (registry, _, session) = setup();
        registry.set_granted(GrantedPermissionSet::from_names(["content.read"]));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();
        let before = session.grants();

        registry.set_failure(Some(InjectedFailure::Offline));
        assert!(session.refresh().is_err());
        assert_eq!(session.grants(), before);
        assert!(session.snapshot().last_error.is_some());

        registry.set_failure(None);
        session.refresh().unwrap();
        assert!(session.snapshot().last_error.is_none());
    }

    #[test]
    fn test_unauthorized_refresh_tears_down() {
        let (registry, store, session) = setup();
        registry.set_granted(GrantedPermissionSet::from_names(["content.read"]));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();

        registry.set_failure(Some(InjectedFailure::Unauthorized));
        assert!(matches!(session.refresh(), Err(Error::Unauthorized(_))));
        assert!(session.principal().is_none());
        assert!(session.grants().is_empty());
        assert!(!store.contains(DEFAULT_GRANTS_KEY));
    }

    #[test]
    fn test_clear_then_load_is_empty() {
        let (registry, _, session) = setup();
        registry.set_granted(GrantedPermissionSet::from_names(["content.read"]));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();

        session.clear().unwrap();
        assert_eq!(session.load(), 0);
        let snapshot = session.snapshot();
        assert!(snapshot.grants.is_empty());
        assert!(!snapshot.is_loading);
    }

    #[test]
    fn test_principal_switch_clears() {
        let (registry, store, session) = setup();
        registry.set_granted(GrantedPermissionSet::from_names(["settings.manage"]));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();

        session.init(Principal::company_user("u-2")).unwrap();
        assert!(session.grants().is_empty());
        assert!(!store.contains(DEFAULT_GRANTS_KEY));
        assert!(!session.has_permission(Resource::Settings, Action::Read));
    }

    #[test]
    fn test_same_principal_reinit_keeps_grants() {
        let (registry, _, session) = setup();
        registry.set_granted(GrantedPermissionSet::from_names(["content.read"]));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();

        session.init(Principal::company_user("u-1")).unwrap();
        assert_eq!(session.grants().len(), 1);
    }

    #[test]
    fn test_require() {
        let (registry, _, session) = setup();
        registry.set_granted(GrantedPermissionSet::from_names(["role.read"]));
        session.init(Principal::company_user("u-1")).unwrap();
        session.load();
        session.refresh().unwrap();

        assert!(session.require(Resource::Role, Action::Read).is_ok());
        let err = session.require(Resource::Role, Action::Delete).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { ref permission } if permission == "role.delete"));
        assert!(
            session
                .require_any(&[(Resource::Role, Action::Update), (Resource::Role, Action::Read)])
                .is_ok()
        );
    }

    #[test]
    fn test_snapshot_hides_grants_while_loading() {
        let (_, store, session) = setup();
        store
            .save(DEFAULT_GRANTS_KEY, &GrantedPermissionSet::from_names(["content.read"]))
            .unwrap();
        session.init(Principal::company_user("u-1")).unwrap();
        let snapshot = session.snapshot();
        assert!(snapshot.is_loading);
        assert!(!snapshot.has_permission(Resource::Content, Action::Read));
    }

    #[test]
    fn test_snapshot_helpers() {
        let snapshot = PermissionSnapshot::ready(
            Some(Principal::company_user("u-1")),
            std::iter::once(GrantedPermission::new(
                "p1",
                PermissionKey::new(Resource::Analytics, Action::Manage).name(),
            ))
            .collect(),
        );
        assert!(snapshot.has_permission(Resource::Analytics, Action::Read));
        assert!(snapshot.has_any_permission(&[
            (Resource::User, Action::Read),
            (Resource::Analytics, Action::Delete)
        ]));
    }

    mod stale_responses {
        use super::*;
        use crate::models::{NewRole, Permission, PermissionId, Role, RoleId, RoleUpdate};
        use crate::services::PermissionFilter;
        use std::sync::Mutex;
        use std::sync::mpsc::{Receiver, Sender, channel};

        type Reply = Sender<Result<GrantedPermissionSet>>;

        /// Registry whose grant fetches each block until the test answers them.
        struct GatedRegistry {
            calls: Mutex<Sender<Reply>>,
        }

        impl RegistryClient for GatedRegistry {
            fn fetch_granted_permissions(&self) -> Result<GrantedPermissionSet> {
                let (reply, response) = channel();
                self.calls
                    .lock()
                    .map_err(|_| Error::operation("fetch", "poisoned"))?
                    .send(reply)
                    .map_err(|e| Error::operation("fetch", e))?;
                response.recv().map_err(|e| Error::operation("fetch", e))?
            }
            fn list_permissions(&self, _: &PermissionFilter) -> Result<Vec<Permission>> {
                Ok(Vec::new())
            }
            fn list_roles(&self, _: Option<&str>) -> Result<Vec<Role>> {
                Ok(Vec::new())
            }
            fn create_role(&self, _: &NewRole) -> Result<Role> {
                Err(Error::operation("create_role", "unsupported"))
            }
            fn update_role(&self, _: &RoleId, _: &RoleUpdate) -> Result<Role> {
                Err(Error::operation("update_role", "unsupported"))
            }
            fn assign_permissions(&self, _: &RoleId, _: &[PermissionId]) -> Result<Role> {
                Err(Error::operation("assign_permissions", "unsupported"))
            }
            fn delete_role(&self, _: &RoleId) -> Result<()> {
                Err(Error::operation("delete_role", "unsupported"))
            }
        }

        fn gated() -> (Arc<PermissionSession>, Arc<MemoryGrantStore>, Receiver<Reply>) {
            let (calls_tx, calls_rx) = channel();
            let registry = Arc::new(GatedRegistry {
                calls: Mutex::new(calls_tx),
            });
            let store = Arc::new(MemoryGrantStore::new());
            let session = Arc::new(PermissionSession::new(registry, store.clone()));
            session.init(Principal::company_user("u-1")).unwrap();
            session.load();
            (session, store, calls_rx)
        }

        fn spawn_refresh(
            session: &Arc<PermissionSession>,
        ) -> std::thread::JoinHandle<Result<RefreshOutcome>> {
            let session = Arc::clone(session);
            std::thread::spawn(move || session.refresh())
        }

        #[test]
        fn test_response_after_clear_is_discarded() {
            let (session, store, calls) = gated();
            let worker = spawn_refresh(&session);
            let reply = calls.recv().unwrap();
            assert!(session.snapshot().is_refreshing);

            session.clear().unwrap();
            reply
                .send(Ok(GrantedPermissionSet::from_names(["content.read"])))
                .unwrap();

            assert_eq!(worker.join().unwrap().unwrap(), RefreshOutcome::Discarded);
            assert!(session.grants().is_empty());
            assert!(!store.contains(DEFAULT_GRANTS_KEY));
            assert!(!session.snapshot().is_refreshing);
        }

        #[test]
        fn test_older_response_never_overwrites_newer() {
            let (session, store, calls) = gated();
            let first = spawn_refresh(&session);
            let first_reply = calls.recv().unwrap();
            let second = spawn_refresh(&session);
            let second_reply = calls.recv().unwrap();

            second_reply
                .send(Ok(GrantedPermissionSet::from_names(["user.read", "role.read"])))
                .unwrap();
            assert_eq!(
                second.join().unwrap().unwrap(),
                RefreshOutcome::Applied { count: 2 }
            );

            first_reply
                .send(Ok(GrantedPermissionSet::from_names(["content.read"])))
                .unwrap();
            assert_eq!(first.join().unwrap().unwrap(), RefreshOutcome::Discarded);

            assert!(session.has_permission(Resource::User, Action::Read));
            assert!(!session.has_permission(Resource::Content, Action::Read));
            assert_eq!(store.load(DEFAULT_GRANTS_KEY).unwrap().unwrap().len(), 2);
        }

        #[test]
        fn test_teardown_during_refresh() {
            let (session, _, calls) = gated();
            let worker = spawn_refresh(&session);
            let reply = calls.recv().unwrap();
            session.teardown().unwrap();
            reply
                .send(Ok(GrantedPermissionSet::from_names(["content.read"])))
                .unwrap();
            assert_eq!(worker.join().unwrap().unwrap(), RefreshOutcome::Discarded);
            assert!(session.principal().is_none());
            assert!(session.grants().is_empty());
        }

        #[test]
        fn test_unauthorized_on_superseded_ticket_tears_down() {
            let (session, store, calls) = gated();
            let first = spawn_refresh(&session);
            let first_reply = calls.recv().unwrap();
            let second = spawn_refresh(&session);
            let second_reply = calls.recv().unwrap();

            second_reply
                .send(Ok(GrantedPermissionSet::from_names(["content.read"])))
                .unwrap();
            assert_eq!(
                second.join().unwrap().unwrap(),
                RefreshOutcome::Applied { count: 1 }
            );

            first_reply
                .send(Err(Error::Unauthorized("session expired".to_string())))
                .unwrap();
            assert!(matches!(first.join().unwrap(), Err(Error::Unauthorized(_))));
            assert!(session.principal().is_none());
            assert!(session.grants().is_empty());
            assert!(!store.contains(DEFAULT_GRANTS_KEY));
        }

        #[test]
        fn test_superseded_failure_is_returned_not_recorded() {
            let (session, _, calls) = gated();
            let first = spawn_refresh(&session);
            let first_reply = calls.recv().unwrap();
            let second = spawn_refresh(&session);
            let second_reply = calls.recv().unwrap();

            second_reply
                .send(Ok(GrantedPermissionSet::from_names(["content.read"])))
                .unwrap();
            second.join().unwrap().unwrap();

            first_reply
                .send(Err(Error::operation("fetch", "connect error")))
                .unwrap();
            assert!(matches!(
                first.join().unwrap(),
                Err(Error::OperationFailed { .. })
            ));
            assert!(session.has_permission(Resource::Content, Action::Read));
            assert!(session.snapshot().last_error.is_none());
        }

        #[test]
        fn test_unauthorized_for_previous_account_leaves_new_one_bound() {
            let (session, _, calls) = gated();
            let worker = spawn_refresh(&session);
            let reply = calls.recv().unwrap();
            session.teardown().unwrap();
            session.init(Principal::company_user("u-2")).unwrap();

            reply
                .send(Err(Error::Unauthorized("session expired".to_string())))
                .unwrap();
            assert!(matches!(worker.join().unwrap(), Err(Error::Unauthorized(_))));
            assert_eq!(session.principal().map(|p| p.id), Some("u-2".to_string()));
        }
    }

    mod interrupted_load {
        use super::*;
        use std::sync::Mutex;
        use std::sync::mpsc::{Receiver, Sender, channel};

        /// Store that pauses every load after reading until the test releases it.
        struct GatedStore {
            inner: MemoryGrantStore,
            reads: Mutex<Sender<Sender<()>>>,
        }

        impl GrantStore for GatedStore {
            fn load(&self, key: &str) -> Result<Option<GrantedPermissionSet>> {
                let value = self.inner.load(key)?;
                let (release, wait) = channel();
                self.reads
                    .lock()
                    .map_err(|_| Error::operation("load", "poisoned"))?
                    .send(release)
                    .map_err(|e| Error::operation("load", e))?;
                wait.recv().map_err(|e| Error::operation("load", e))?;
                Ok(value)
            }
            fn save(&self, key: &str, grants: &GrantedPermissionSet) -> Result<()> {
                self.inner.save(key, grants)
            }
            fn remove(&self, key: &str) -> Result<bool> {
                self.inner.remove(key)
            }
        }

        fn gated_store() -> (Arc<PermissionSession>, Arc<GatedStore>, Receiver<Sender<()>>) {
            let (reads_tx, reads_rx) = channel();
            let store = Arc::new(GatedStore {
                inner: MemoryGrantStore::new(),
                reads: Mutex::new(reads_tx),
            });
            store
                .save(DEFAULT_GRANTS_KEY, &GrantedPermissionSet::from_names(["settings.manage"]))
                .unwrap();
            let registry = Arc::new(InMemoryRegistry::with_full_catalogue());
            let session = Arc::new(PermissionSession::new(registry, store.clone()));
            (session, store, reads_rx)
        }

        #[test]
        fn test_load_overlapping_logout_is_dropped() {
            let (session, store, reads) = gated_store();
            session.init(Principal::company_user("u-1")).unwrap();
            let worker = {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.load())
            };
            let release = reads.recv().unwrap();

            session.teardown().unwrap();
            release.send(()).unwrap();
            assert_eq!(worker.join().unwrap(), 0);

            session.init(Principal::company_user("u-2")).unwrap();
            assert!(session.is_loading());
            assert!(!session.has_permission(Resource::Settings, Action::Delete));
            assert!(!store.inner.contains(DEFAULT_GRANTS_KEY));
        }

        #[test]
        fn test_load_without_clear_still_applies() {
            let (session, _, reads) = gated_store();
            session.init(Principal::company_user("u-1")).unwrap();
            let worker = {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.load())
            };
            reads.recv().unwrap().send(()).unwrap();
            assert_eq!(worker.join().unwrap(), 1);
            assert!(session.has_permission(Resource::Settings, Action::Delete));
        }
    }

    #[test]
    fn test_concurrent_account_switches_never_keep_old_grants() {
        use std::sync::Barrier;

        for _ in 0..50 {
            let (registry, store, session) = setup();
            registry.set_granted(GrantedPermissionSet::from_names(["content.manage"]));
            session.init(Principal::company_user("u-1")).unwrap();
            session.load();
            session.refresh().unwrap();

            let session = Arc::new(session);
            let barrier = Arc::new(Barrier::new(2));
            let workers: Vec<_> = ["u-2", "u-3"]
                .into_iter()
                .map(|id| {
                    let session = Arc::clone(&session);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        session.init(Principal::company_user(id)).unwrap();
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            assert!(session.grants().is_empty());
            assert!(!store.contains(DEFAULT_GRANTS_KEY));
        }
    }
}
