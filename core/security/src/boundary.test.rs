use super::*;
use pretty_assertions::assert_eq;

fn registration(context_id: &str) -> BoundaryRegistration {
    BoundaryRegistration {
        context_id: context_id.to_string(),
        boundaries: vec![
            "mode:readonly".to_string(),
            "network:allowed".to_string(),
            "tool:blocked:BashTool".to_string(),
            "command:blocked:rm".to_string(),
        ],
        allowed_paths: vec![PathBuf::from("/workspace")],
        expires_at: None,
    }
}

#[test]
fn test_register_then_validate() {
    let manager = SecurityBoundaryManager::new();
    manager.register_boundaries(registration("ctx-1")).unwrap();

    assert!(manager.validate_access("ctx-1", "fs:/workspace/src/main.rs"));
    assert!(!manager.validate_access("ctx-1", "fs:/etc/passwd"));
    assert!(!manager.validate_access("ctx-1", "tool:BashTool"));
    assert!(manager.validate_access("ctx-1", "tool:ReadTool"));
    assert!(!manager.validate_access("ctx-1", "command:rm"));
    assert!(manager.validate_access("ctx-1", "command:ls"));
    assert!(manager.validate_access("ctx-1", "network:fetch"));
    assert!(!manager.validate_access("ctx-1", "system:exec"));
    // Unprefixed operations have no boundary rule and are allowed.
    assert!(manager.validate_access("ctx-1", "analyze"));
}

#[test]
fn test_path_traversal_is_normalized() {
    let manager = SecurityBoundaryManager::new();
    manager.register_boundaries(registration("ctx-1")).unwrap();
    assert!(manager.validate_access("ctx-1", "fs:/workspace/a/../b"));
    assert!(!manager.validate_access("ctx-1", "fs:/workspace/../etc/shadow"));
}

#[test]
fn test_unknown_context_denies() {
    let manager = SecurityBoundaryManager::new();
    assert!(!manager.validate_access("ghost", "tool:ReadTool"));
    let audit = manager.audit_entries_for("ghost");
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].allowed);
}

#[test]
fn test_duplicate_registration_fails() {
    let manager = SecurityBoundaryManager::new();
    manager.register_boundaries(registration("ctx-1")).unwrap();
    let err = manager
        .register_boundaries(registration("ctx-1"))
        .err()
        .unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::BoundaryRegistrationFailed);

    // Unregister-then-register is the sanctioned way to change rules.
    manager.unregister_boundaries("ctx-1");
    assert!(manager.register_boundaries(registration("ctx-1")).is_ok());
}

#[test]
fn test_expired_context_denies_and_flags() {
    let manager = SecurityBoundaryManager::new();
    let mut expired = registration("ctx-exp");
    expired.expires_at = Some(chrono::Utc::now().timestamp_millis() - 1_000);
    manager.register_boundaries(expired).unwrap();

    assert!(!manager.validate_access("ctx-exp", "fs:/workspace/file"));
    assert_eq!(manager.flagged_for_termination(), vec!["ctx-exp".to_string()]);
    assert_eq!(manager.violations("ctx-exp"), 1);
}

#[test]
fn test_violation_counter_counts_denials_only() {
    let manager = SecurityBoundaryManager::new();
    manager.register_boundaries(registration("ctx-1")).unwrap();

    manager.validate_access("ctx-1", "tool:ReadTool");
    manager.validate_access("ctx-1", "tool:BashTool");
    manager.validate_access("ctx-1", "system:exec");
    assert_eq!(manager.violations("ctx-1"), 2);
}

#[test]
fn test_every_decision_is_audited() {
    let manager = SecurityBoundaryManager::new();
    manager.register_boundaries(registration("ctx-1")).unwrap();

    manager.validate_access("ctx-1", "tool:ReadTool");
    manager.validate_access("ctx-1", "tool:BashTool");
    let audit = manager.audit_entries_for("ctx-1");
    assert_eq!(audit.len(), 2);
    assert!(audit[0].allowed);
    assert!(!audit[1].allowed);
}

#[test]
fn test_audit_ring_is_bounded() {
    let manager = SecurityBoundaryManager::new();
    manager.register_boundaries(registration("ctx-1")).unwrap();
    for _ in 0..1100 {
        manager.validate_access("ctx-1", "analyze");
    }
    assert_eq!(manager.audit_entries().len(), 1000);
}

#[test]
fn test_most_specific_tag_wins() {
    let manager = SecurityBoundaryManager::new();
    manager
        .register_boundaries(BoundaryRegistration {
            context_id: "ctx-2".to_string(),
            boundaries: vec![
                // Both tags share the `tool:` prefix and name the same
                // subject; the longer (more specific) one decides.
                "tool:Edit".to_string(),
                "tool:blocked:Edit".to_string(),
            ],
            allowed_paths: vec![],
            expires_at: None,
        })
        .unwrap();
    assert!(!manager.validate_access("ctx-2", "tool:Edit"));
}
