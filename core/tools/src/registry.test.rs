use super::*;
use crate::tool::ToolContext;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::Value;

struct NamedTool {
    name: String,
    description: String,
}

impl NamedTool {
    fn new(name: &str, description: &str) -> Arc<dyn Tool> {
        Arc::new(Self {
            name: name.to_string(),
            description: description.to_string(),
        })
    }
}

#[async_trait]
impl Tool for NamedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> qi_error::Result<Value> {
        Ok(serde_json::json!({"ok": true}))
    }
}

#[test]
fn test_register_get_unregister() {
    let registry = ToolRegistry::new();
    registry
        .register(NamedTool::new("Read", "Read file contents"))
        .unwrap();

    assert!(registry.has("Read"));
    assert!(registry.get("Read").is_ok());

    let err = registry.get("Missing").err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::ToolNotFound);

    registry.unregister("Read").unwrap();
    assert!(!registry.has("Read"));
    let err = registry.unregister("Read").err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::ToolNotFound);
}

#[test]
fn test_duplicate_registration_rejected() {
    let registry = ToolRegistry::new();
    registry.register(NamedTool::new("Read", "v1")).unwrap();
    assert!(registry.register(NamedTool::new("Read", "v2")).is_err());
}

#[test]
fn test_list_is_sorted() {
    let registry = ToolRegistry::new();
    registry.register(NamedTool::new("Write", "w")).unwrap();
    registry.register(NamedTool::new("Bash", "b")).unwrap();
    registry.register(NamedTool::new("Read", "r")).unwrap();
    assert_eq!(registry.list(), vec!["Bash", "Read", "Write"]);
}

#[test]
fn test_discover_matches_name_and_description() {
    let registry = ToolRegistry::new();
    registry
        .register(NamedTool::new("Read", "Read file contents"))
        .unwrap();
    registry
        .register(NamedTool::new("Grep", "Search file contents"))
        .unwrap();
    registry
        .register(NamedTool::new("HttpGet", "Fetch a URL"))
        .unwrap();

    assert_eq!(registry.discover("file"), vec!["Grep", "Read"]);
    assert_eq!(registry.discover("http"), vec!["HttpGet"]);
    assert!(registry.discover("database").is_empty());
}

#[test]
fn test_validate_rejects_empty_name() {
    let outcome = ToolRegistry::validate_tool(&NamedTool {
        name: "  ".to_string(),
        description: "d".to_string(),
    });
    assert!(!outcome.is_valid());
}

#[test]
fn test_stats() {
    let registry = ToolRegistry::new();
    registry.register(NamedTool::new("A", "a")).unwrap();
    registry.register(NamedTool::new("B", "b")).unwrap();
    registry.unregister("A").unwrap();

    let stats = registry.stats();
    assert_eq!(stats.total_registered, 2);
    assert_eq!(stats.total_unregistered, 1);
    assert_eq!(stats.current_count, 1);
}

#[tokio::test]
async fn test_subscription_receives_changes() {
    let registry = ToolRegistry::new();
    let mut subscription = registry.subscribe();

    registry.register(NamedTool::new("Read", "r")).unwrap();
    registry.unregister("Read").unwrap();

    assert_eq!(
        subscription.receiver.recv().await,
        Some(RegistryEvent::Registered {
            name: "Read".to_string()
        })
    );
    assert_eq!(
        subscription.receiver.recv().await,
        Some(RegistryEvent::Unregistered {
            name: "Read".to_string()
        })
    );

    // After unsubscribing no further events arrive.
    registry.unsubscribe(subscription.id());
    registry.register(NamedTool::new("Write", "w")).unwrap();
    assert!(subscription.receiver.try_recv().is_err());
}
