//! Conversation contexts and their kind-derived defaults.

use std::collections::BTreeSet;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use qi_protocol::SecurityRestrictions;

/// Kind of a conversation context. Defaults for restrictions,
/// operations, and expiry derive from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextKind {
    /// The long-lived top-level conversation. Never expires.
    #[default]
    Main,
    /// A spawned sub-agent conversation.
    SubAgent,
    /// A single tool invocation's conversation.
    Tool,
}

impl ContextKind {
    /// Default security restrictions for this kind.
    pub fn default_restrictions(&self) -> SecurityRestrictions {
        match self {
            ContextKind::Main => SecurityRestrictions {
                network_access: true,
                system_access: true,
                ..SecurityRestrictions::default()
            },
            ContextKind::SubAgent => SecurityRestrictions {
                read_only_mode: true,
                require_approval: true,
                max_execution_time_ms: 3 * 60 * 1000,
                max_memory_bytes: 50 * 1024 * 1024,
                ..SecurityRestrictions::default()
            },
            ContextKind::Tool => SecurityRestrictions {
                read_only_mode: true,
                max_execution_time_ms: 60 * 1000,
                max_memory_bytes: 25 * 1024 * 1024,
                ..SecurityRestrictions::default()
            },
        }
    }

    /// Default operation set for this kind.
    pub fn default_operations(&self) -> BTreeSet<String> {
        let mut operations: BTreeSet<String> =
            ["read", "analyze", "generate"].iter().map(|s| s.to_string()).collect();
        match self {
            ContextKind::Main => {
                for op in ["write", "execute", "network:fetch", "system:exec"] {
                    operations.insert(op.to_string());
                }
            }
            ContextKind::SubAgent => {
                operations.insert("write".to_string());
            }
            ContextKind::Tool => {}
        }
        operations
    }

    /// Default lifetime in milliseconds; `None` means no expiry.
    pub fn default_expiry_ms(&self) -> Option<i64> {
        match self {
            ContextKind::Main => None,
            ContextKind::SubAgent => Some(5 * 60 * 1000),
            ContextKind::Tool => Some(60 * 1000),
        }
    }

    /// Get the kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Main => "main",
            ContextKind::SubAgent => "sub-agent",
            ContextKind::Tool => "tool",
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Originator of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMessageRole {
    User,
    Agent,
    System,
}

/// One entry in a context's append-only message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// Who produced the message.
    pub role: ContextMessageRole,
    /// Message content.
    pub content: String,
    /// Creation timestamp (Unix milliseconds).
    pub timestamp: i64,
}

impl ContextMessage {
    /// Create a message stamped now.
    pub fn new(role: ContextMessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A scoped conversation envelope.
///
/// The message list is append-only; instances handed out by the
/// manager are deep copies, so external mutation never reaches the
/// registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Unique id.
    pub id: String,
    /// Parent context id; `None` for roots.
    pub parent_id: Option<String>,
    /// Kind the defaults derive from.
    pub kind: ContextKind,
    /// Creation timestamp (Unix milliseconds).
    pub created_at: i64,
    /// Expiry timestamp; `None` for main contexts.
    pub expires_at: Option<i64>,
    /// Append-only message list.
    pub messages: Vec<ContextMessage>,
    /// Security restrictions in force.
    pub restrictions: SecurityRestrictions,
    /// Operation tags this context may perform.
    pub allowed_operations: BTreeSet<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

impl ConversationContext {
    /// Create a context of the given kind with kind-derived defaults.
    pub fn new(kind: ContextKind, parent_id: Option<String>) -> Self {
        let now_ms = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id,
            kind,
            created_at: now_ms,
            expires_at: kind.default_expiry_ms().map(|ttl| now_ms + ttl),
            messages: Vec::new(),
            restrictions: kind.default_restrictions(),
            allowed_operations: kind.default_operations(),
            metadata: HashMap::new(),
        }
    }

    /// True once the expiry timestamp has passed.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| now_ms > at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults() {
        let main = ContextKind::Main;
        assert!(main.default_restrictions().network_access);
        assert!(main.default_restrictions().system_access);
        assert!(main.default_expiry_ms().is_none());
        assert!(main.default_operations().contains("execute"));

        let sub = ContextKind::SubAgent;
        assert!(sub.default_restrictions().read_only_mode);
        assert!(sub.default_restrictions().require_approval);
        assert_eq!(sub.default_restrictions().max_execution_time_ms, 180_000);
        assert_eq!(sub.default_expiry_ms(), Some(300_000));
        assert!(sub.default_operations().contains("write"));
        assert!(!sub.default_operations().contains("execute"));

        let tool = ContextKind::Tool;
        assert_eq!(tool.default_restrictions().max_execution_time_ms, 60_000);
        assert_eq!(
            tool.default_operations(),
            ["read", "analyze", "generate"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
    }

    #[test]
    fn test_main_context_never_expires() {
        let context = ConversationContext::new(ContextKind::Main, None);
        assert!(context.expires_at.is_none());
        assert!(!context.is_expired(i64::MAX));
    }

    #[test]
    fn test_sub_agent_expiry_set() {
        let context = ConversationContext::new(ContextKind::SubAgent, None);
        let expires_at = context.expires_at.unwrap();
        assert!(expires_at > context.created_at);
        assert!(context.is_expired(expires_at + 1));
        assert!(!context.is_expired(expires_at));
    }
}
