use super::*;
use pretty_assertions::assert_eq;

fn user(user_id: &str) -> PermissionContext {
    PermissionContext {
        user_id: Some(user_id.to_string()),
        ..PermissionContext::default()
    }
}

#[test]
fn test_guest_denied_without_rules() {
    let manager = PermissionManager::new();
    let result =
        manager.check_tool_permission("BashTool", AccessAction::Execute, &user("guest-user"));
    assert!(!result.allowed);
    assert_eq!(result.reason.as_deref(), Some("No permission rule found"));
    assert_eq!(result.required_level, Some(Role::Guest));
}

#[test]
fn test_role_hierarchy_satisfies_rules() {
    let manager = PermissionManager::new();
    manager
        .register_rule(PermissionRule::new(
            Role::User,
            ResourceType::File,
            AccessAction::Read,
        ))
        .unwrap();
    manager.assign_user_role("dev", "DEVELOPER").unwrap();
    manager.assign_user_role("visitor", "GUEST").unwrap();

    // Developer outranks the rule's User requirement.
    assert!(
        manager
            .check_tool_permission("ReadTool", AccessAction::Read, &user("dev"))
            .allowed
    );
    assert!(
        !manager
            .check_tool_permission("ReadTool", AccessAction::Read, &user("visitor"))
            .allowed
    );
}

#[test]
fn test_user_role_overrides_session_role() {
    let manager = PermissionManager::new();
    manager.assign_user_role("alice", "ADMIN").unwrap();
    manager.assign_session_role("sess-1", "GUEST").unwrap();

    let context = PermissionContext {
        user_id: Some("alice".to_string()),
        session_id: Some("sess-1".to_string()),
        path: None,
    };
    assert_eq!(manager.resolve_role(&context), Role::Admin);

    let session_only = PermissionContext {
        user_id: None,
        session_id: Some("sess-1".to_string()),
        path: None,
    };
    assert_eq!(manager.resolve_role(&session_only), Role::Guest);
}

#[test]
fn test_glob_path_patterns() {
    let manager = PermissionManager::new();
    manager
        .register_rule(
            PermissionRule::new(Role::User, ResourceType::File, AccessAction::Write)
                .with_path_pattern("/workspace/**"),
        )
        .unwrap();
    manager.assign_user_role("u", "USER").unwrap();

    let mut context = user("u");
    context.path = Some("/workspace/src/deep/main.rs".to_string());
    assert!(
        manager
            .check_tool_permission("WriteTool", AccessAction::Write, &context)
            .allowed
    );

    context.path = Some("/etc/passwd".to_string());
    assert!(
        !manager
            .check_tool_permission("WriteTool", AccessAction::Write, &context)
            .allowed
    );

    // Path-scoped rules never match a check without a path.
    context.path = None;
    assert!(
        !manager
            .check_tool_permission("WriteTool", AccessAction::Write, &context)
            .allowed
    );
}

#[test]
fn test_invalid_role_rejected() {
    let manager = PermissionManager::new();
    let err = manager.assign_user_role("u", "SUPERUSER").err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::InvalidRole);
}

#[test]
fn test_duplicate_rule_rejected() {
    let manager = PermissionManager::new();
    let rule = PermissionRule::new(Role::User, ResourceType::File, AccessAction::Read);
    manager.register_rule(rule.clone()).unwrap();
    let err = manager.register_rule(rule).err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::InvalidRule);
}

#[test]
fn test_bad_glob_rejected() {
    let manager = PermissionManager::new();
    let err = manager
        .register_rule(
            PermissionRule::new(Role::User, ResourceType::File, AccessAction::Read)
                .with_path_pattern("/ws/[unclosed"),
        )
        .err()
        .unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::InvalidRule);
}

#[test]
fn test_every_check_appends_one_audit_entry() {
    let manager = PermissionManager::new();
    manager
        .register_rule(PermissionRule::new(
            Role::Guest,
            ResourceType::File,
            AccessAction::Read,
        ))
        .unwrap();

    manager.check_tool_permission("ReadTool", AccessAction::Read, &user("a"));
    manager.check_tool_permission("BashTool", AccessAction::Execute, &user("a"));
    let audit = manager.audit_entries();
    assert_eq!(audit.len(), 2);
    assert!(audit[0].allowed);
    assert!(!audit[1].allowed);
}

#[test]
fn test_tool_classifier() {
    assert_eq!(classify_tool("BashTool"), ResourceType::System);
    assert_eq!(classify_tool("ProcessSpawner"), ResourceType::System);
    assert_eq!(classify_tool("HttpGet"), ResourceType::Network);
    assert_eq!(classify_tool("WebFetch"), ResourceType::Network);
    assert_eq!(classify_tool("SqlRunner"), ResourceType::Database);
    assert_eq!(classify_tool("ReadTool"), ResourceType::File);
    assert_eq!(classify_tool("EditTool"), ResourceType::File);
}
