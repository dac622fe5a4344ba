//! Audit logging.
//!
//! Records role mutations, denied administrative operations and session
//! teardown. Entries are kept in memory, emitted on the `audit` tracing
//! target, and optionally appended to a JSON-lines file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: String,
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Event type, e.g. `role.delete`.
    pub event_type: String,
    /// Principal that triggered the event, or `system`.
    pub actor: String,
    /// Record affected, e.g. a role id.
    pub resource: Option<String>,
    /// Action taken.
    pub action: String,
    /// Outcome.
    pub outcome: AuditOutcome,
    /// Additional metadata.
    pub metadata: serde_json::Value,
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Action succeeded.
    Success,
    /// Action failed.
    Failure,
    /// Action was denied.
    Denied,
}

impl AuditOutcome {
    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Denied => "denied",
        }
    }
}

impl AuditEntry {
    /// Creates a new audit entry for the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.into(),
            actor: "system".to_string(),
            resource: None,
            action: action.into(),
            outcome: AuditOutcome::Success,
            metadata: serde_json::Value::Null,
        }
    }

    /// Sets the actor.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Sets the resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub const fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Sets metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Audit logger configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Path to a JSON-lines audit file.
    pub log_path: Option<PathBuf>,
    /// Whether entries are also emitted as tracing events.
    pub log_tracing: bool,
    /// Maximum number of entries kept in memory.
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            log_tracing: true,
            max_entries: 1_000,
        }
    }
}

impl AuditConfig {
    /// Sets the log path.
    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Disables tracing output.
    #[must_use]
    pub const fn without_tracing(mut self) -> Self {
        self.log_tracing = false;
        self
    }
}

/// Audit logger for authorization events.
#[derive(Debug, Default)]
pub struct AuditLogger {
    config: AuditConfig,
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLogger {
    /// Creates a new audit logger with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new audit logger with custom config.
    #[must_use]
    pub fn with_config(config: AuditConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Logs a custom audit entry.
    pub fn log_entry(&self, entry: AuditEntry) {
        if self.config.log_tracing {
            tracing::info!(
                target: "audit",
                event_type = %entry.event_type,
                action = %entry.action,
                actor = %entry.actor,
                resource = entry.resource.as_deref(),
                outcome = entry.outcome.as_str(),
                "audit event"
            );
        }

        if let Some(ref path) = self.config.log_path {
            if let Err(e) = Self::append_to_file(path, &entry) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to append audit entry");
            }
        }

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
            let overflow = entries.len().saturating_sub(self.config.max_entries);
            if overflow > 0 {
                entries.drain(..overflow);
            }
        }
    }

    /// Logs a role create/update/delete/assignment.
    pub fn log_role_mutation(
        &self,
        actor: &str,
        operation: &str,
        role_id: Option<&str>,
        outcome: AuditOutcome,
        metadata: serde_json::Value,
    ) {
        let mut entry = AuditEntry::new(format!("role.{operation}"), operation)
            .with_actor(actor)
            .with_outcome(outcome)
            .with_metadata(metadata);
        if let Some(role_id) = role_id {
            entry = entry.with_resource(role_id);
        }
        self.log_entry(entry);
    }

    /// Logs an operation refused on the client side.
    pub fn log_denied(&self, actor: &str, action: &str, reason: &str) {
        let entry = AuditEntry::new("security.denied", action)
            .with_actor(actor)
            .with_outcome(AuditOutcome::Denied)
            .with_metadata(serde_json::json!({ "reason": reason }));
        self.log_entry(entry);
    }

    /// Logs a session lifecycle event such as teardown.
    pub fn log_session(&self, actor: &str, action: &str, reason: &str) {
        let entry = AuditEntry::new("session.lifecycle", action)
            .with_actor(actor)
            .with_metadata(serde_json::json!({ "reason": reason }));
        self.log_entry(entry);
    }

    /// Returns recent audit entries, newest first.
    #[must_use]
    pub fn recent_entries(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries.lock().map_or_else(
            |_| Vec::new(),
            |entries| entries.iter().rev().take(limit).cloned().collect(),
        )
    }

    /// Returns all entries since a given timestamp.
    #[must_use]
    pub fn entries_since(&self, since: DateTime<Utc>) -> Vec<AuditEntry> {
        self.entries.lock().map_or_else(
            |_| Vec::new(),
            |entries| {
                entries
                    .iter()
                    .filter(|e| e.timestamp >= since)
                    .cloned()
                    .collect()
            },
        )
    }

    fn append_to_file(path: &Path, entry: &AuditEntry) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{line}")
    }
}
