//! The context manager: lifecycle, hierarchy, and the expiry sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;

use qi_error::QiError;
use qi_error::Result;
use qi_security::BoundaryRegistration;
use qi_security::SecurityBoundaryManager;

use crate::app::AppContext;
use crate::app::AppContextUpdate;
use crate::conversation::ContextKind;
use crate::conversation::ContextMessage;
use crate::conversation::ConversationContext;
use crate::isolated::IsolatedContext;
use crate::isolated::IsolatedContextSpec;

/// Cadence of the expiry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Owns the application context and the flat context registries.
///
/// All reads hand out deep copies; all mutation funnels through these
/// methods. Contexts form a tree through parent ids only, so hierarchy
/// queries walk ids, never object graphs.
pub struct ContextManager {
    app: Mutex<AppContext>,
    conversations: Mutex<HashMap<String, ConversationContext>>,
    isolated: Mutex<HashMap<String, IsolatedContext>>,
    security: Arc<SecurityBoundaryManager>,
}

impl ContextManager {
    /// Create a manager capturing the process environment.
    pub fn new(security: Arc<SecurityBoundaryManager>) -> Self {
        Self {
            app: Mutex::new(AppContext::capture()),
            conversations: Mutex::new(HashMap::new()),
            isolated: Mutex::new(HashMap::new()),
            security,
        }
    }

    /// Deep copy of the application context.
    pub fn application_context(&self) -> AppContext {
        self.lock(&self.app).clone()
    }

    /// Apply a partial update to the application context.
    pub fn update_application_context(&self, update: AppContextUpdate) {
        let mut app = self.lock(&self.app);
        if let Some(cwd) = update.cwd {
            app.cwd = cwd;
        }
        for (key, value) in update.environment {
            app.environment.insert(key, value);
        }
        for (key, value) in update.metadata {
            app.metadata.insert(key, value);
        }
    }

    /// Create a conversation context and register its boundaries.
    ///
    /// Returns a deep copy of the stored context.
    pub fn create_conversation_context(
        &self,
        kind: ContextKind,
        parent_id: Option<&str>,
    ) -> Result<ConversationContext> {
        if let Some(parent) = parent_id {
            if !self.lock(&self.conversations).contains_key(parent) {
                return Err(QiError::context_not_found(parent));
            }
        }
        let context = ConversationContext::new(kind, parent_id.map(String::from));
        self.security.register_boundaries(BoundaryRegistration {
            context_id: context.id.clone(),
            boundaries: context.restrictions.boundary_tags(),
            allowed_paths: context.restrictions.allowed_paths.clone(),
            expires_at: context.expires_at,
        })?;
        debug!(context_id = %context.id, kind = %kind, "Created conversation context");
        self.lock(&self.conversations)
            .insert(context.id.clone(), context.clone());
        Ok(context)
    }

    /// Deep copy of a conversation context. Expired contexts fail with
    /// `CONTEXT_EXPIRED`.
    pub fn get_context(&self, context_id: &str) -> Result<ConversationContext> {
        let conversations = self.lock(&self.conversations);
        let context = conversations
            .get(context_id)
            .ok_or_else(|| QiError::context_not_found(context_id))?;
        if context.is_expired(chrono::Utc::now().timestamp_millis()) {
            return Err(QiError::context_expired(context_id));
        }
        Ok(context.clone())
    }

    /// Append a message to a context. Messages are never removed or
    /// rewritten.
    pub fn add_message(&self, context_id: &str, message: ContextMessage) -> Result<()> {
        let mut conversations = self.lock(&self.conversations);
        let context = conversations
            .get_mut(context_id)
            .ok_or_else(|| QiError::context_not_found(context_id))?;
        context.messages.push(message);
        Ok(())
    }

    /// Deep copies of a context's direct children.
    pub fn get_child_contexts(&self, context_id: &str) -> Vec<ConversationContext> {
        self.lock(&self.conversations)
            .values()
            .filter(|context| context.parent_id.as_deref() == Some(context_id))
            .cloned()
            .collect()
    }

    /// Ids from the given context up to its root (self first).
    pub fn get_context_hierarchy(&self, context_id: &str) -> Vec<String> {
        let conversations = self.lock(&self.conversations);
        let mut chain = Vec::new();
        let mut cursor = Some(context_id.to_string());
        while let Some(id) = cursor {
            let Some(context) = conversations.get(&id) else {
                break;
            };
            chain.push(id);
            cursor = context.parent_id.clone();
        }
        chain
    }

    /// Terminate a context and every descendant, unregistering the
    /// security boundaries of each in the same pass.
    pub fn terminate_context(&self, context_id: &str) -> Result<()> {
        if !self.lock(&self.conversations).contains_key(context_id) {
            return Err(QiError::context_not_found(context_id));
        }

        // Collect the subtree by walking parent ids breadth-first.
        let mut doomed = vec![context_id.to_string()];
        let mut index = 0;
        while index < doomed.len() {
            let parent = doomed[index].clone();
            let children: Vec<String> = self
                .lock(&self.conversations)
                .values()
                .filter(|context| context.parent_id.as_deref() == Some(parent.as_str()))
                .map(|context| context.id.clone())
                .collect();
            doomed.extend(children);
            index += 1;
        }

        // Isolated envelopes hang off conversation contexts.
        let isolated_doomed: Vec<String> = self
            .lock(&self.isolated)
            .values()
            .filter(|isolated| doomed.contains(&isolated.parent_context_id))
            .map(|isolated| isolated.id.clone())
            .collect();

        for id in &isolated_doomed {
            self.lock(&self.isolated).remove(id);
            self.security.unregister_boundaries(id);
        }
        for id in &doomed {
            self.lock(&self.conversations).remove(id);
            self.security.unregister_boundaries(id);
        }
        info!(
            context_id = %context_id,
            terminated = doomed.len() + isolated_doomed.len(),
            "Terminated context subtree"
        );
        Ok(())
    }

    /// Create an isolated context, registering its boundaries
    /// atomically: a failed registration aborts creation.
    pub fn create_isolated_context(&self, spec: IsolatedContextSpec) -> Result<IsolatedContext> {
        if !self
            .lock(&self.conversations)
            .contains_key(&spec.parent_context_id)
        {
            return Err(QiError::context_not_found(&spec.parent_context_id));
        }
        let context = IsolatedContext::from_spec(&spec);
        self.security.register_boundaries(BoundaryRegistration {
            context_id: context.id.clone(),
            boundaries: context.boundaries.clone(),
            allowed_paths: context.allowed_paths.clone(),
            expires_at: Some(context.expires_at),
        })?;
        debug!(context_id = %context.id, task = %context.task, "Created isolated context");
        self.lock(&self.isolated)
            .insert(context.id.clone(), context.clone());
        Ok(context)
    }

    /// Deep copy of an isolated context. Expired envelopes fail with
    /// `CONTEXT_EXPIRED` and are terminated immediately.
    pub fn get_isolated_context(&self, context_id: &str) -> Result<IsolatedContext> {
        let context = {
            let isolated = self.lock(&self.isolated);
            isolated
                .get(context_id)
                .cloned()
                .ok_or_else(|| QiError::context_not_found(context_id))?
        };
        if context.is_expired(chrono::Utc::now().timestamp_millis()) {
            self.lock(&self.isolated).remove(context_id);
            self.security.unregister_boundaries(context_id);
            return Err(QiError::context_expired(context_id));
        }
        Ok(context)
    }

    /// Validate one operation against a context's registered boundaries.
    pub fn validate_access(&self, context_id: &str, operation: &str) -> bool {
        self.security.validate_access(context_id, operation)
    }

    /// Audit entries recorded for one context.
    pub fn audit_entries_for(&self, context_id: &str) -> Vec<qi_security::AuditEntry> {
        self.security.audit_entries_for(context_id)
    }

    /// Terminate every expired context. Returns the terminated ids.
    pub fn sweep(&self) -> Vec<String> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut terminated = Vec::new();

        let expired_isolated: Vec<String> = self
            .lock(&self.isolated)
            .values()
            .filter(|context| context.is_expired(now_ms))
            .map(|context| context.id.clone())
            .collect();
        for id in expired_isolated {
            self.lock(&self.isolated).remove(&id);
            self.security.unregister_boundaries(&id);
            terminated.push(id);
        }

        // Contexts the boundary manager flagged on expired accesses.
        for id in self.security.flagged_for_termination() {
            if self.lock(&self.isolated).remove(&id).is_some() {
                self.security.unregister_boundaries(&id);
                if !terminated.contains(&id) {
                    terminated.push(id);
                }
            }
        }

        let expired_conversations: Vec<String> = self
            .lock(&self.conversations)
            .values()
            .filter(|context| context.is_expired(now_ms))
            .map(|context| context.id.clone())
            .collect();
        for id in expired_conversations {
            if self.terminate_context(&id).is_ok() {
                terminated.push(id);
            }
        }

        if !terminated.is_empty() {
            info!(count = terminated.len(), "Expiry sweep terminated contexts");
        }
        terminated
    }

    /// Spawn the periodic expiry sweep.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a fresh
            // manager is not swept at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.sweep();
            }
        })
    }

    /// Number of live conversation contexts.
    pub fn conversation_count(&self) -> usize {
        self.lock(&self.conversations).len()
    }

    /// Number of live isolated contexts.
    pub fn isolated_count(&self) -> usize {
        self.lock(&self.isolated).len()
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("conversations", &self.conversation_count())
            .field("isolated", &self.isolated_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "manager.test.rs"]
mod tests;
