//! Session store adapter.
//!
//! Persistence format and location are opaque to the core: it only
//! sees the [`SessionStore`] trait. [`MemorySessionStore`] is the
//! bundled in-memory implementation used by the CLI default
//! configuration and by tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use qi_error::ErrorCode;
use qi_error::QiError;
use qi_error::Result;

/// One stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique id.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Working directory the session was created in.
    pub cwd: PathBuf,
    /// Creation timestamp (Unix milliseconds).
    pub created_at: i64,
    /// Files referenced during the session.
    pub file_references: Vec<PathBuf>,
}

/// Persistence seam for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Prepare the store for use.
    async fn initialize(&self) -> Result<()>;

    /// Create and persist a new session.
    async fn create_session(&self, title: &str, cwd: &std::path::Path) -> Result<Session>;

    /// Fetch a session by id.
    async fn get_session(&self, session_id: &str) -> Result<Session>;

    /// Record a file reference against a session.
    async fn add_file_reference(&self, session_id: &str, file_path: &std::path::Path)
    -> Result<()>;

    /// Flush sessions to the backing store.
    async fn save_sessions(&self) -> Result<()>;
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no session is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn create_session(&self, title: &str, cwd: &std::path::Path) -> Result<Session> {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            cwd: cwd.to_path_buf(),
            created_at: chrono::Utc::now().timestamp_millis(),
            file_references: Vec::new(),
        };
        debug!(session_id = %session.id, title = %title, "Created session");
        self.lock().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.lock().get(session_id).cloned().ok_or_else(|| {
            QiError::business(
                ErrorCode::SessionNotFound,
                format!("Session not found: {session_id}"),
            )
        })
    }

    async fn add_file_reference(
        &self,
        session_id: &str,
        file_path: &std::path::Path,
    ) -> Result<()> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(session_id).ok_or_else(|| {
            QiError::business(
                ErrorCode::SessionNotFound,
                format!("Session not found: {session_id}"),
            )
        })?;
        let path = file_path.to_path_buf();
        if !session.file_references.contains(&path) {
            session.file_references.push(path);
        }
        Ok(())
    }

    async fn save_sessions(&self) -> Result<()> {
        // Memory-backed; nothing to flush.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemorySessionStore::new();
        store.initialize().await.unwrap();

        let session = store
            .create_session("debugging", std::path::Path::new("/workspace"))
            .await
            .unwrap();
        let fetched = store.get_session(&session.id).await.unwrap();
        assert_eq!(fetched, session);

        let err = store.get_session("missing").await.err().unwrap();
        assert_eq!(err.code, ErrorCode::SessionNotFound);
    }

    #[tokio::test]
    async fn test_file_references_deduplicate() {
        let store = MemorySessionStore::new();
        let session = store
            .create_session("s", std::path::Path::new("/"))
            .await
            .unwrap();

        let path = std::path::Path::new("/workspace/src/main.rs");
        store.add_file_reference(&session.id, path).await.unwrap();
        store.add_file_reference(&session.id, path).await.unwrap();

        let fetched = store.get_session(&session.id).await.unwrap();
        assert_eq!(fetched.file_references.len(), 1);
        store.save_sessions().await.unwrap();
    }
}
