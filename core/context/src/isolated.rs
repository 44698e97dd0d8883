//! Isolated execution contexts.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use qi_protocol::AgentSpecialization;
use qi_protocol::SecurityRestrictions;

/// Request to create an isolated context.
#[derive(Debug, Clone)]
pub struct IsolatedContextSpec {
    /// Context the envelope is spawned under.
    pub parent_context_id: String,
    /// Task description.
    pub task: String,
    /// Agent specialization; narrows the operation set.
    pub specialization: AgentSpecialization,
    /// Restrictions in force; further narrows the operation set.
    pub restrictions: SecurityRestrictions,
    /// Filesystem roots the envelope may touch.
    pub allowed_paths: Vec<PathBuf>,
    /// Lifetime; expiry is mandatory.
    pub time_limit: Duration,
    /// Memory cap in bytes.
    pub memory_limit: u64,
}

impl IsolatedContextSpec {
    /// Create a spec with conservative defaults.
    pub fn new(parent_context_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            parent_context_id: parent_context_id.into(),
            task: task.into(),
            specialization: AgentSpecialization::General,
            restrictions: SecurityRestrictions {
                read_only_mode: true,
                ..SecurityRestrictions::default()
            },
            allowed_paths: Vec::new(),
            time_limit: Duration::from_secs(60),
            memory_limit: 25 * 1024 * 1024,
        }
    }

    /// Set the specialization.
    pub fn with_specialization(mut self, specialization: AgentSpecialization) -> Self {
        self.specialization = specialization;
        self
    }

    /// Set the restrictions.
    pub fn with_restrictions(mut self, restrictions: SecurityRestrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    /// Set the allowed filesystem roots.
    pub fn with_allowed_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.allowed_paths = paths;
        self
    }

    /// Set the lifetime.
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Derive the operation set: specialization first, then restriction
    /// filtering (read-only strips write/execute, missing network or
    /// system access strips the corresponding namespaced operations).
    pub fn derive_operations(&self) -> BTreeSet<String> {
        self.specialization
            .allowed_operations()
            .iter()
            .filter(|op| {
                if self.restrictions.read_only_mode
                    && matches!(**op, "write" | "execute" | "fs:write")
                {
                    return false;
                }
                if !self.restrictions.network_access && op.starts_with("network:") {
                    return false;
                }
                if !self.restrictions.system_access && op.starts_with("system:") {
                    return false;
                }
                true
            })
            .map(|op| op.to_string())
            .collect()
    }
}

/// A strictly scoped execution envelope with a mandatory expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolatedContext {
    /// Unique id.
    pub id: String,
    /// Context the envelope was spawned under.
    pub parent_context_id: String,
    /// Task description.
    pub task: String,
    /// Operations the envelope may perform.
    pub allowed_operations: BTreeSet<String>,
    /// Filesystem roots the envelope may touch.
    pub allowed_paths: Vec<PathBuf>,
    /// Lifetime in milliseconds.
    pub time_limit_ms: u64,
    /// Memory cap in bytes.
    pub memory_limit: u64,
    /// Boundary tags registered with the security manager.
    pub boundaries: Vec<String>,
    /// Creation timestamp (Unix milliseconds).
    pub created_at: i64,
    /// Mandatory expiry timestamp (Unix milliseconds).
    pub expires_at: i64,
}

impl IsolatedContext {
    /// Materialize an envelope from a spec.
    pub fn from_spec(spec: &IsolatedContextSpec) -> Self {
        let now_ms = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_context_id: spec.parent_context_id.clone(),
            task: spec.task.clone(),
            allowed_operations: spec.derive_operations(),
            allowed_paths: spec.allowed_paths.clone(),
            time_limit_ms: spec.time_limit.as_millis() as u64,
            memory_limit: spec.memory_limit,
            boundaries: spec.restrictions.boundary_tags(),
            created_at: now_ms,
            expires_at: now_ms + spec.time_limit.as_millis() as i64,
        }
    }

    /// True once the expiry timestamp has passed.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_only_strips_write_and_execute() {
        let spec = IsolatedContextSpec::new("parent", "edit files")
            .with_specialization(AgentSpecialization::FileOperations);
        let operations = spec.derive_operations();
        assert!(operations.contains("read"));
        assert!(!operations.contains("write"));
        assert!(!operations.contains("fs:write"));
    }

    #[test]
    fn test_network_ops_require_network_access() {
        let mut spec = IsolatedContextSpec::new("parent", "research")
            .with_specialization(AgentSpecialization::Research);
        assert!(!spec.derive_operations().contains("network:fetch"));

        spec.restrictions.network_access = true;
        assert!(spec.derive_operations().contains("network:fetch"));
    }

    #[test]
    fn test_system_ops_require_system_access() {
        let mut spec = IsolatedContextSpec::new("parent", "admin")
            .with_specialization(AgentSpecialization::SystemAdmin);
        spec.restrictions.read_only_mode = false;
        assert!(!spec.derive_operations().contains("system:exec"));

        spec.restrictions.system_access = true;
        assert!(spec.derive_operations().contains("system:exec"));
    }

    #[test]
    fn test_expiry_is_mandatory() {
        let spec =
            IsolatedContextSpec::new("parent", "t").with_time_limit(Duration::from_millis(500));
        let context = IsolatedContext::from_spec(&spec);
        assert_eq!(context.expires_at, context.created_at + 500);
        assert!(context.is_expired(context.expires_at + 1));
    }
}
