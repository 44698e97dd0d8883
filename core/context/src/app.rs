//! Process-wide application context.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Working directory, environment, and metadata captured at startup.
///
/// Mutated only through
/// [`ContextManager::update_application_context`](crate::ContextManager::update_application_context);
/// reads hand out deep copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppContext {
    /// Current working directory.
    pub cwd: PathBuf,
    /// Environment map snapshot.
    pub environment: HashMap<String, String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
}

impl AppContext {
    /// Capture the process environment and working directory.
    pub fn capture() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            environment: std::env::vars().collect(),
            metadata: HashMap::new(),
        }
    }
}

/// A partial update applied to the application context.
#[derive(Debug, Clone, Default)]
pub struct AppContextUpdate {
    /// New working directory, when set.
    pub cwd: Option<PathBuf>,
    /// Environment entries to insert or overwrite.
    pub environment: Vec<(String, String)>,
    /// Metadata entries to insert or overwrite.
    pub metadata: Vec<(String, String)>,
}

impl AppContextUpdate {
    /// An update that only changes the working directory.
    pub fn cwd(path: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(path.into()),
            ..Self::default()
        }
    }

    /// Add an environment entry.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_has_cwd() {
        let app = AppContext::capture();
        assert!(!app.cwd.as_os_str().is_empty());
    }

    #[test]
    fn test_update_builder() {
        let update = AppContextUpdate::cwd("/tmp")
            .with_env("KEY", "value")
            .with_metadata("mode", "test");
        assert_eq!(update.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
        assert_eq!(update.environment.len(), 1);
        assert_eq!(update.metadata.len(), 1);
    }
}
