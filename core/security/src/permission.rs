//! Role-based ACL for tool execution.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use globset::Glob;
use globset::GlobMatcher;
use tracing::debug;

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;
use qi_protocol::AccessAction;
use qi_protocol::PermissionCheckResult;
use qi_protocol::PermissionRule;
use qi_protocol::ResourceType;
use qi_protocol::Role;

use crate::AUDIT_LOG_CAPACITY;
use crate::audit::AuditEntry;
use crate::audit::AuditLog;

/// Principal information for a permission check.
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    /// Authenticated user id, if any. Overrides the session role.
    pub user_id: Option<String>,
    /// Session id, if any.
    pub session_id: Option<String>,
    /// Path the operation touches, for path-scoped rules.
    pub path: Option<String>,
}

struct CompiledRule {
    rule: PermissionRule,
    matcher: Option<GlobMatcher>,
}

/// Role maps plus the immutable rule table.
pub struct PermissionManager {
    user_roles: Mutex<HashMap<String, Role>>,
    session_roles: Mutex<HashMap<String, Role>>,
    rules: Mutex<Vec<CompiledRule>>,
    audit: Mutex<AuditLog>,
}

impl Default for PermissionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionManager {
    /// Create a manager with no roles and no rules.
    pub fn new() -> Self {
        Self {
            user_roles: Mutex::new(HashMap::new()),
            session_roles: Mutex::new(HashMap::new()),
            rules: Mutex::new(Vec::new()),
            audit: Mutex::new(AuditLog::new(AUDIT_LOG_CAPACITY)),
        }
    }

    /// Assign a role to a user id. Unknown role names fail with
    /// `INVALID_ROLE`.
    pub fn assign_user_role(&self, user_id: &str, role: &str) -> Result<()> {
        let role = Role::from_str(role).map_err(|_| {
            QiError::validation(ErrorCode::InvalidRole, format!("Unknown role: {role}"))
        })?;
        self.lock(&self.user_roles).insert(user_id.to_string(), role);
        Ok(())
    }

    /// Assign a role to a session id. Unknown role names fail with
    /// `INVALID_ROLE`.
    pub fn assign_session_role(&self, session_id: &str, role: &str) -> Result<()> {
        let role = Role::from_str(role).map_err(|_| {
            QiError::validation(ErrorCode::InvalidRole, format!("Unknown role: {role}"))
        })?;
        self.lock(&self.session_roles)
            .insert(session_id.to_string(), role);
        Ok(())
    }

    /// Register a rule. Duplicates and malformed glob patterns fail with
    /// `INVALID_RULE`. Rules are immutable once registered.
    pub fn register_rule(&self, rule: PermissionRule) -> Result<()> {
        let mut rules = self.lock(&self.rules);
        if rules.iter().any(|existing| existing.rule == rule) {
            return Err(QiError::validation(
                ErrorCode::InvalidRule,
                "Duplicate permission rule",
            ));
        }
        let matcher = match &rule.path_pattern {
            Some(pattern) => Some(
                Glob::new(pattern)
                    .map_err(|e| {
                        QiError::validation(
                            ErrorCode::InvalidRule,
                            format!("Invalid path pattern {pattern}: {e}"),
                        )
                    })?
                    .compile_matcher(),
            ),
            None => None,
        };
        debug!(?rule, "Registered permission rule");
        rules.push(CompiledRule { rule, matcher });
        Ok(())
    }

    /// Resolve the effective role: user assignment wins over session
    /// assignment; unknown principals are guests.
    pub fn resolve_role(&self, context: &PermissionContext) -> Role {
        if let Some(user_id) = &context.user_id {
            if let Some(role) = self.lock(&self.user_roles).get(user_id) {
                return *role;
            }
        }
        if let Some(session_id) = &context.session_id {
            if let Some(role) = self.lock(&self.session_roles).get(session_id) {
                return *role;
            }
        }
        Role::Guest
    }

    /// Check whether the principal may perform `action` with the named
    /// tool. Exactly one audit entry is appended per check.
    pub fn check_tool_permission(
        &self,
        tool_name: &str,
        action: AccessAction,
        context: &PermissionContext,
    ) -> PermissionCheckResult {
        let role = self.resolve_role(context);
        let resource = classify_tool(tool_name);
        let principal = context
            .user_id
            .clone()
            .or_else(|| context.session_id.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        let operation = format!("{tool_name}:{}", action.as_ref());

        let allowed = self.lock(&self.rules).iter().any(|compiled| {
            compiled.rule.resource == resource
                && compiled.rule.action == action
                && compiled.rule.role <= role
                && match (&compiled.matcher, &context.path) {
                    (Some(matcher), Some(path)) => matcher.is_match(path),
                    (Some(_), None) => false,
                    (None, _) => true,
                }
        });

        let result = if allowed {
            PermissionCheckResult::allowed()
        } else {
            PermissionCheckResult::denied("No permission rule found", Some(role))
        };
        self.lock_audit().append(AuditEntry::now(
            principal,
            operation,
            result.allowed,
            result
                .reason
                .clone()
                .unwrap_or_else(|| format!("Allowed for role {}", role.as_ref())),
        ));
        result
    }

    /// Snapshot of the audit ring.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.lock_audit().entries()
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_audit(&self) -> std::sync::MutexGuard<'_, AuditLog> {
        self.lock(&self.audit)
    }
}

impl std::fmt::Debug for PermissionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionManager").finish_non_exhaustive()
    }
}

/// Fixed tool-name → resource classifier.
///
/// Shell/process tools map to SYSTEM, HTTP tools to NETWORK, database
/// tools to DATABASE; everything else is treated as a FILE tool.
pub fn classify_tool(tool_name: &str) -> ResourceType {
    let name = tool_name.to_ascii_lowercase();
    const SYSTEM_MARKERS: [&str; 4] = ["bash", "shell", "process", "exec"];
    const NETWORK_MARKERS: [&str; 4] = ["http", "fetch", "web", "curl"];
    const DATABASE_MARKERS: [&str; 3] = ["sql", "database", "query"];

    if SYSTEM_MARKERS.iter().any(|marker| name.contains(marker)) {
        ResourceType::System
    } else if NETWORK_MARKERS.iter().any(|marker| name.contains(marker)) {
        ResourceType::Network
    } else if DATABASE_MARKERS.iter().any(|marker| name.contains(marker)) {
        ResourceType::Database
    } else {
        ResourceType::File
    }
}

#[cfg(test)]
#[path = "permission.test.rs"]
mod tests;
