use super::*;
use crate::conversation::ContextMessageRole;
use pretty_assertions::assert_eq;
use qi_protocol::AgentSpecialization;
use std::path::PathBuf;

fn new_manager() -> ContextManager {
    ContextManager::new(Arc::new(SecurityBoundaryManager::new()))
}

#[test]
fn test_reads_are_deep_copies() {
    let manager = new_manager();
    let created = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();

    let mut copy = manager.get_context(&created.id).unwrap();
    copy.messages.push(ContextMessage::new(
        ContextMessageRole::User,
        "mutating the copy",
    ));
    copy.metadata.insert("k".to_string(), "v".to_string());

    // Internal state is untouched by mutating the copy.
    let fresh = manager.get_context(&created.id).unwrap();
    assert!(fresh.messages.is_empty());
    assert!(fresh.metadata.is_empty());
}

#[test]
fn test_messages_are_append_only() {
    let manager = new_manager();
    let context = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();

    manager
        .add_message(
            &context.id,
            ContextMessage::new(ContextMessageRole::User, "first"),
        )
        .unwrap();
    let after_one = manager.get_context(&context.id).unwrap().messages;

    manager
        .add_message(
            &context.id,
            ContextMessage::new(ContextMessageRole::Agent, "second"),
        )
        .unwrap();
    let after_two = manager.get_context(&context.id).unwrap().messages;

    // The longer list extends the shorter one.
    assert_eq!(after_two[..after_one.len()], after_one[..]);
    assert_eq!(after_two.len(), 2);
}

#[test]
fn test_hierarchy_walks_ids() {
    let manager = new_manager();
    let root = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();
    let child = manager
        .create_conversation_context(ContextKind::SubAgent, Some(&root.id))
        .unwrap();
    let grandchild = manager
        .create_conversation_context(ContextKind::Tool, Some(&child.id))
        .unwrap();

    assert_eq!(
        manager.get_context_hierarchy(&grandchild.id),
        vec![grandchild.id.clone(), child.id.clone(), root.id.clone()]
    );

    let children = manager.get_child_contexts(&root.id);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, child.id);
}

#[test]
fn test_unknown_parent_rejected() {
    let manager = new_manager();
    let err = manager
        .create_conversation_context(ContextKind::SubAgent, Some("ghost"))
        .err()
        .unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::ContextNotFound);
}

#[test]
fn test_termination_cascades_to_descendants() {
    let security = Arc::new(SecurityBoundaryManager::new());
    let manager = ContextManager::new(security.clone());
    let root = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();
    let child = manager
        .create_conversation_context(ContextKind::SubAgent, Some(&root.id))
        .unwrap();
    let grandchild = manager
        .create_conversation_context(ContextKind::Tool, Some(&child.id))
        .unwrap();
    let isolated = manager
        .create_isolated_context(IsolatedContextSpec::new(child.id.clone(), "subtask"))
        .unwrap();

    manager.terminate_context(&root.id).unwrap();

    for id in [&root.id, &child.id, &grandchild.id] {
        assert_eq!(
            manager.get_context(id).err().unwrap().code,
            qi_error::ErrorCode::ContextNotFound
        );
    }
    assert_eq!(
        manager.get_isolated_context(&isolated.id).err().unwrap().code,
        qi_error::ErrorCode::ContextNotFound
    );
    // Boundaries are gone with the contexts.
    assert!(!security.is_registered(&root.id));
    assert!(!security.is_registered(&isolated.id));
    assert_eq!(manager.conversation_count(), 0);
    assert_eq!(manager.isolated_count(), 0);
}

#[test]
fn test_isolated_expiry_read_fails_and_terminates() {
    let manager = new_manager();
    let parent = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();
    let isolated = manager
        .create_isolated_context(
            IsolatedContextSpec::new(parent.id.clone(), "blink")
                .with_time_limit(std::time::Duration::from_millis(10)),
        )
        .unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));

    assert!(!manager.validate_access(&isolated.id, "read"));
    let err = manager.get_isolated_context(&isolated.id).err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::ContextExpired);
    // The expired read already terminated the envelope.
    assert_eq!(manager.isolated_count(), 0);
}

#[test]
fn test_failed_boundary_registration_aborts_creation() {
    let security = Arc::new(SecurityBoundaryManager::new());
    let manager = ContextManager::new(security.clone());
    let parent = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();

    let first = manager
        .create_isolated_context(IsolatedContextSpec::new(parent.id.clone(), "task"))
        .unwrap();

    // An id collision at the security manager rejects the registration
    // and the registry stays unchanged.
    let err = security
        .register_boundaries(qi_security::BoundaryRegistration {
            context_id: first.id.clone(),
            boundaries: vec![],
            allowed_paths: vec![],
            expires_at: None,
        })
        .err()
        .unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::BoundaryRegistrationFailed);
    assert_eq!(manager.isolated_count(), 1);
}

#[test]
fn test_isolated_operations_filtered_by_spec() {
    let manager = new_manager();
    let parent = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();
    let isolated = manager
        .create_isolated_context(
            IsolatedContextSpec::new(parent.id.clone(), "analyze code")
                .with_specialization(AgentSpecialization::CodeAnalysis)
                .with_allowed_paths(vec![PathBuf::from("/workspace")]),
        )
        .unwrap();

    assert!(isolated.allowed_operations.contains("parse"));
    assert!(!isolated.allowed_operations.contains("write"));
    assert!(manager.validate_access(&isolated.id, "fs:/workspace/src/lib.rs"));
    assert!(!manager.validate_access(&isolated.id, "fs:/etc/passwd"));
    assert!(!manager.validate_access(&isolated.id, "network:fetch"));

    // Every validation above was audited under the envelope's id.
    let audit = manager.audit_entries_for(&isolated.id);
    assert_eq!(audit.len(), 3);
    assert!(audit[0].allowed);
    assert!(!audit[1].allowed);
}

#[test]
fn test_sweep_terminates_expired() {
    let manager = new_manager();
    let parent = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();
    manager
        .create_isolated_context(
            IsolatedContextSpec::new(parent.id.clone(), "short")
                .with_time_limit(std::time::Duration::from_millis(5)),
        )
        .unwrap();
    manager
        .create_isolated_context(
            IsolatedContextSpec::new(parent.id.clone(), "long")
                .with_time_limit(std::time::Duration::from_secs(3600)),
        )
        .unwrap();

    std::thread::sleep(std::time::Duration::from_millis(15));
    let terminated = manager.sweep();
    assert_eq!(terminated.len(), 1);
    assert_eq!(manager.isolated_count(), 1);
    // The main conversation context survives every sweep.
    assert_eq!(manager.conversation_count(), 1);
}

#[test]
fn test_update_application_context() {
    let manager = new_manager();
    manager.update_application_context(
        crate::AppContextUpdate::cwd("/workspace/project").with_env("QI_MODE", "test"),
    );
    let app = manager.application_context();
    assert_eq!(app.cwd, PathBuf::from("/workspace/project"));
    assert_eq!(
        app.environment.get("QI_MODE").map(String::as_str),
        Some("test")
    );
}

#[tokio::test]
async fn test_spawn_sweeper_runs() {
    let manager = Arc::new(new_manager());
    let parent = manager
        .create_conversation_context(ContextKind::Main, None)
        .unwrap();
    manager
        .create_isolated_context(
            IsolatedContextSpec::new(parent.id.clone(), "ephemeral")
                .with_time_limit(std::time::Duration::from_millis(5)),
        )
        .unwrap();

    let handle = manager.spawn_sweeper(std::time::Duration::from_millis(20));
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    assert_eq!(manager.isolated_count(), 0);
    handle.abort();
}
