//! Security data model: restrictions, roles, permission rules.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use strum::AsRefStr;
use strum::EnumString;

/// Role resolved for a user or session.
///
/// Roles are ordered: a rule requiring `Developer` is satisfied by
/// `Developer` and `Admin`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    AsRefStr,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Guest,
    User,
    Developer,
    Admin,
}

/// Resource classes a permission rule can cover.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    File,
    System,
    Network,
    Database,
}

/// Actions a permission rule can grant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessAction {
    Read,
    Write,
    Execute,
    Delete,
}

/// One entry in the permission rule table.
///
/// Rules are immutable after registration; changing one requires
/// unregister-then-register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Minimum role the rule grants the action to.
    pub role: Role,
    /// Resource class covered.
    pub resource: ResourceType,
    /// Action granted.
    pub action: AccessAction,
    /// Optional glob pattern scoping file rules (`**` recurses).
    pub path_pattern: Option<String>,
}

impl PermissionRule {
    /// Create an unscoped rule.
    pub fn new(role: Role, resource: ResourceType, action: AccessAction) -> Self {
        Self {
            role,
            resource,
            action,
            path_pattern: None,
        }
    }

    /// Scope the rule to a glob path pattern.
    pub fn with_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.path_pattern = Some(pattern.into());
        self
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCheckResult {
    /// Whether the operation is permitted.
    pub allowed: bool,
    /// Denial reason, when not allowed.
    pub reason: Option<String>,
    /// The role that was resolved for the caller.
    pub required_level: Option<Role>,
}

impl PermissionCheckResult {
    /// An allow decision.
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            required_level: None,
        }
    }

    /// A deny decision with a human-readable reason.
    pub fn denied(reason: impl Into<String>, required_level: Option<Role>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            required_level,
        }
    }
}

/// Restrictions attached to a conversation or isolated context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRestrictions {
    /// Write/execute operations are stripped when set.
    pub read_only_mode: bool,
    /// Filesystem roots the context may touch.
    pub allowed_paths: Vec<PathBuf>,
    /// Commands the context may never run.
    pub blocked_commands: Vec<String>,
    /// Tools the context may never invoke.
    pub blocked_tools: Vec<String>,
    /// Whether destructive operations need explicit approval.
    pub require_approval: bool,
    /// Execution time cap in milliseconds.
    pub max_execution_time_ms: u64,
    /// Memory cap in bytes.
    pub max_memory_bytes: u64,
    /// Whether network operations are permitted.
    pub network_access: bool,
    /// Whether system operations are permitted.
    pub system_access: bool,
}

impl Default for SecurityRestrictions {
    fn default() -> Self {
        Self {
            read_only_mode: false,
            allowed_paths: Vec::new(),
            blocked_commands: Vec::new(),
            blocked_tools: Vec::new(),
            require_approval: false,
            max_execution_time_ms: 120_000,
            max_memory_bytes: 100 * 1024 * 1024,
            network_access: false,
            system_access: false,
        }
    }
}

impl SecurityRestrictions {
    /// Render this restriction set as boundary tags for registration.
    pub fn boundary_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        if self.read_only_mode {
            tags.push("mode:readonly".to_string());
        }
        if self.network_access {
            tags.push("network:allowed".to_string());
        }
        if self.system_access {
            tags.push("system:allowed".to_string());
        }
        for tool in &self.blocked_tools {
            tags.push(format!("tool:blocked:{tool}"));
        }
        for command in &self.blocked_commands {
            tags.push(format!("command:blocked:{command}"));
        }
        tags
    }
}

/// Specialization of a spawned sub-agent; narrows its operation set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AgentSpecialization {
    FileOperations,
    CodeAnalysis,
    Documentation,
    Testing,
    Research,
    SystemAdmin,
    #[default]
    General,
}

impl AgentSpecialization {
    /// Operations this specialization is allowed to perform, before
    /// restriction filtering.
    pub fn allowed_operations(&self) -> &'static [&'static str] {
        match self {
            AgentSpecialization::FileOperations => {
                &["read", "analyze", "generate", "write", "fs:read", "fs:write"]
            }
            AgentSpecialization::CodeAnalysis => {
                &["read", "analyze", "generate", "fs:read", "parse"]
            }
            AgentSpecialization::Documentation => {
                &["read", "analyze", "generate", "write", "fs:read"]
            }
            AgentSpecialization::Testing => {
                &["read", "analyze", "generate", "execute", "fs:read"]
            }
            AgentSpecialization::Research => {
                &["read", "analyze", "generate", "network:fetch"]
            }
            AgentSpecialization::SystemAdmin => {
                &["read", "analyze", "generate", "execute", "system:exec"]
            }
            AgentSpecialization::General => &["read", "analyze", "generate"],
        }
    }

    /// Get the specialization as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentSpecialization::FileOperations => "file-operations",
            AgentSpecialization::CodeAnalysis => "code-analysis",
            AgentSpecialization::Documentation => "documentation",
            AgentSpecialization::Testing => "testing",
            AgentSpecialization::Research => "research",
            AgentSpecialization::SystemAdmin => "system-admin",
            AgentSpecialization::General => "general",
        }
    }
}

impl std::fmt::Display for AgentSpecialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[path = "security.test.rs"]
mod tests;
