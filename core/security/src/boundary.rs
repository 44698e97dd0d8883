//! Per-context security boundary enforcement.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;
use tracing::warn;

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;

use crate::AUDIT_LOG_CAPACITY;
use crate::audit::AuditEntry;
use crate::audit::AuditLog;
use crate::paths::path_is_allowed;

/// Boundaries registered for one context.
///
/// Immutable after registration; changes require
/// unregister-then-register.
#[derive(Debug, Clone)]
pub struct BoundaryRegistration {
    /// Context the boundaries apply to.
    pub context_id: String,
    /// Opaque boundary tags (`mode:readonly`, `network:allowed`,
    /// `tool:blocked:<name>`, `command:blocked:<name>`).
    pub boundaries: Vec<String>,
    /// Filesystem roots `fs:` operations may touch.
    pub allowed_paths: Vec<PathBuf>,
    /// Hard expiry (Unix milliseconds); accesses after it are denied
    /// and the context is flagged for termination.
    pub expires_at: Option<i64>,
}

#[derive(Debug)]
struct BoundaryEntry {
    registration: BoundaryRegistration,
    violations: u64,
    flagged_for_termination: bool,
}

/// Registry of boundary registrations keyed by context id.
#[derive(Debug)]
pub struct SecurityBoundaryManager {
    entries: Mutex<HashMap<String, BoundaryEntry>>,
    audit: Mutex<AuditLog>,
}

impl Default for SecurityBoundaryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityBoundaryManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            audit: Mutex::new(AuditLog::new(AUDIT_LOG_CAPACITY)),
        }
    }

    /// Register boundaries for a context.
    ///
    /// A second registration for the same id fails; rules never mutate
    /// in place.
    pub fn register_boundaries(&self, registration: BoundaryRegistration) -> Result<()> {
        let mut entries = self.lock_entries();
        if entries.contains_key(&registration.context_id) {
            return Err(QiError::system(
                ErrorCode::BoundaryRegistrationFailed,
                format!(
                    "Boundaries already registered for context {}",
                    registration.context_id
                ),
            ));
        }
        debug!(context_id = %registration.context_id, "Registering security boundaries");
        entries.insert(
            registration.context_id.clone(),
            BoundaryEntry {
                registration,
                violations: 0,
                flagged_for_termination: false,
            },
        );
        Ok(())
    }

    /// Remove a context's boundaries. Idempotent.
    pub fn unregister_boundaries(&self, context_id: &str) {
        if self.lock_entries().remove(context_id).is_some() {
            debug!(context_id = %context_id, "Unregistered security boundaries");
        }
    }

    /// True if the context has registered boundaries.
    pub fn is_registered(&self, context_id: &str) -> bool {
        self.lock_entries().contains_key(context_id)
    }

    /// Validate one operation against a context's boundaries.
    ///
    /// Operations dispatch on their prefix: `fs:<path>`, `tool:<name>`,
    /// `command:<name>`, `network:*`, `system:*`; anything else is
    /// allowed. Expired contexts always deny and are flagged for
    /// termination. Every decision is audited; denials increment the
    /// context's violation counter.
    pub fn validate_access(&self, context_id: &str, operation: &str) -> bool {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut entries = self.lock_entries();

        let Some(entry) = entries.get_mut(context_id) else {
            drop(entries);
            self.record(context_id, operation, false, "No boundaries registered");
            return false;
        };

        if let Some(expires_at) = entry.registration.expires_at {
            if now_ms > expires_at {
                entry.violations += 1;
                entry.flagged_for_termination = true;
                drop(entries);
                warn!(context_id = %context_id, "Access after context expiry");
                self.record(context_id, operation, false, "Context has expired");
                return false;
            }
        }

        let (allowed, reason) = decide(&entry.registration, operation);
        if !allowed {
            entry.violations += 1;
        }
        drop(entries);
        self.record(context_id, operation, allowed, reason);
        allowed
    }

    /// Denied-access count for a context (0 when unknown).
    pub fn violations(&self, context_id: &str) -> u64 {
        self.lock_entries()
            .get(context_id)
            .map(|entry| entry.violations)
            .unwrap_or(0)
    }

    /// Context ids flagged for termination by expiry checks.
    pub fn flagged_for_termination(&self) -> Vec<String> {
        self.lock_entries()
            .iter()
            .filter(|(_, entry)| entry.flagged_for_termination)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Snapshot of the audit ring.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.lock_audit().entries()
    }

    /// Audit entries for one context.
    pub fn audit_entries_for(&self, context_id: &str) -> Vec<AuditEntry> {
        self.lock_audit().entries_for(context_id)
    }

    fn record(&self, context_id: &str, operation: &str, allowed: bool, reason: impl Into<String>) {
        self.lock_audit()
            .append(AuditEntry::now(context_id, operation, allowed, reason));
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, BoundaryEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_audit(&self) -> std::sync::MutexGuard<'_, AuditLog> {
        match self.audit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Decide one operation against a registration.
///
/// When several boundary tags share the operation's prefix, the most
/// specific (longest) matching tag wins; with no matching rule the
/// operation is allowed.
fn decide(registration: &BoundaryRegistration, operation: &str) -> (bool, String) {
    if let Some(path) = operation.strip_prefix("fs:") {
        return if path_is_allowed(path, &registration.allowed_paths) {
            (true, format!("Path {path} is within allowed roots"))
        } else {
            (false, format!("Path {path} is outside allowed roots"))
        };
    }
    if let Some(tool) = operation.strip_prefix("tool:") {
        return match most_specific_tag(&registration.boundaries, "tool:", tool) {
            Some(tag) if tag.starts_with("tool:blocked:") => {
                (false, format!("Tool {tool} is blocked"))
            }
            _ => (true, format!("Tool {tool} is not blocked")),
        };
    }
    if let Some(command) = operation.strip_prefix("command:") {
        return match most_specific_tag(&registration.boundaries, "command:", command) {
            Some(tag) if tag.starts_with("command:blocked:") => {
                (false, format!("Command {command} is blocked"))
            }
            _ => (true, format!("Command {command} is not blocked")),
        };
    }
    if operation.starts_with("network:") {
        return if registration.boundaries.iter().any(|t| t == "network:allowed") {
            (true, "Network access granted".to_string())
        } else {
            (false, "Network access not granted".to_string())
        };
    }
    if operation.starts_with("system:") {
        return if registration.boundaries.iter().any(|t| t == "system:allowed") {
            (true, "System access granted".to_string())
        } else {
            (false, "System access not granted".to_string())
        };
    }
    (true, "No boundary rule matches; allowed".to_string())
}

/// The longest tag under `prefix` whose final segment names `subject`.
fn most_specific_tag<'a>(tags: &'a [String], prefix: &str, subject: &str) -> Option<&'a str> {
    tags.iter()
        .filter(|tag| tag.starts_with(prefix))
        .filter(|tag| {
            tag.rsplit(':')
                .next()
                .is_some_and(|candidate| candidate == subject)
        })
        .max_by_key(|tag| tag.len())
        .map(String::as_str)
}

#[cfg(test)]
#[path = "boundary.test.rs"]
mod tests;
