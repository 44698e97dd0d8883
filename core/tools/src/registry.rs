//! Tool registry with change subscriptions.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;

use crate::tool::Tool;
use crate::tool::ValidationOutcome;

/// A registry change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A tool was registered.
    Registered { name: String },
    /// A tool was unregistered.
    Unregistered { name: String },
}

/// Registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Registrations over the registry's lifetime.
    pub total_registered: u64,
    /// Unregistrations over the registry's lifetime.
    pub total_unregistered: u64,
    /// Tools currently registered.
    pub current_count: usize,
}

/// A live change subscription. Dropping the subscription or calling
/// [`ToolRegistry::unsubscribe`] with its id stops delivery.
pub struct RegistrySubscription {
    id: u64,
    /// Channel of registry events.
    pub receiver: mpsc::UnboundedReceiver<RegistryEvent>,
}

impl RegistrySubscription {
    /// The handle used to unsubscribe.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Name-keyed tool registry.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<RegistryEvent>>>,
    next_subscription: AtomicU64,
    stats: Mutex<RegistryStats>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            stats: Mutex::new(RegistryStats::default()),
        }
    }

    /// Register a tool. Duplicate names are rejected.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        if let ValidationOutcome::Invalid { errors } = Self::validate_tool(tool.as_ref()) {
            return Err(QiError::validation(
                ErrorCode::InvalidInput,
                format!("Tool failed validation: {}", errors.join(", ")),
            ));
        }
        let name = tool.name().to_string();
        {
            let mut tools = self.write_tools();
            if tools.contains_key(&name) {
                return Err(QiError::validation(
                    ErrorCode::InvalidInput,
                    format!("Tool already registered: {name}"),
                ));
            }
            tools.insert(name.clone(), tool);
        }
        {
            let mut stats = self.lock_stats();
            stats.total_registered += 1;
            stats.current_count = self.read_tools().len();
        }
        debug!(tool = %name, "Registered tool");
        self.publish(RegistryEvent::Registered { name });
        Ok(())
    }

    /// Remove a tool by name.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let removed = self.write_tools().remove(name).is_some();
        if !removed {
            return Err(QiError::tool_not_found(name));
        }
        {
            let mut stats = self.lock_stats();
            stats.total_unregistered += 1;
            stats.current_count = self.read_tools().len();
        }
        debug!(tool = %name, "Unregistered tool");
        self.publish(RegistryEvent::Unregistered {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Resolve a tool by name. Fails with `TOOL_NOT_FOUND` on miss.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.read_tools()
            .get(name)
            .cloned()
            .ok_or_else(|| QiError::tool_not_found(name))
    }

    /// True if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.read_tools().contains_key(name)
    }

    /// All registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_tools().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names whose name or description contains `query`
    /// (case-insensitive), sorted.
    pub fn discover(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        let mut names: Vec<String> = self
            .read_tools()
            .values()
            .filter(|tool| {
                tool.name().to_lowercase().contains(&query)
                    || tool.description().to_lowercase().contains(&query)
            })
            .map(|tool| tool.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Structural checks applied at registration.
    pub fn validate_tool(tool: &dyn Tool) -> ValidationOutcome {
        let mut errors = Vec::new();
        if tool.name().trim().is_empty() {
            errors.push("Tool name must not be empty".to_string());
        }
        if tool.description().trim().is_empty() {
            errors.push("Tool description must not be empty".to_string());
        }
        if !tool.input_schema().is_object() {
            errors.push("Input schema must be a JSON object".to_string());
        }
        if errors.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid { errors }
        }
    }

    /// Snapshot of the registry counters.
    pub fn stats(&self) -> RegistryStats {
        *self.lock_stats()
    }

    /// Subscribe to registry changes.
    pub fn subscribe(&self) -> RegistrySubscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock_subscribers().insert(id, sender);
        RegistrySubscription { id, receiver }
    }

    /// Stop delivery for a subscription id.
    pub fn unsubscribe(&self, id: u64) {
        self.lock_subscribers().remove(&id);
    }

    fn publish(&self, event: RegistryEvent) {
        // Drop subscribers whose receiver is gone.
        self.lock_subscribers()
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    fn read_tools(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        match self.tools.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_tools(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        match self.tools.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, RegistryStats> {
        match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_subscribers(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<RegistryEvent>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "registry.test.rs"]
mod tests;
