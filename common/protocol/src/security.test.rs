use super::*;
use pretty_assertions::assert_eq;
use std::str::FromStr;

#[test]
fn test_role_ordering() {
    assert!(Role::Admin > Role::Developer);
    assert!(Role::Developer > Role::User);
    assert!(Role::User > Role::Guest);
    assert_eq!(Role::default(), Role::Guest);
}

#[test]
fn test_role_parsing() {
    assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
    assert_eq!(Role::from_str("guest").unwrap(), Role::Guest);
    assert!(Role::from_str("superuser").is_err());
}

#[test]
fn test_restriction_defaults() {
    let restrictions = SecurityRestrictions::default();
    assert!(!restrictions.read_only_mode);
    assert!(!restrictions.network_access);
    assert_eq!(restrictions.max_execution_time_ms, 120_000);
}

#[test]
fn test_boundary_tags() {
    let restrictions = SecurityRestrictions {
        read_only_mode: true,
        network_access: true,
        blocked_tools: vec!["BashTool".to_string()],
        blocked_commands: vec!["rm".to_string()],
        ..SecurityRestrictions::default()
    };
    let tags = restrictions.boundary_tags();
    assert!(tags.contains(&"mode:readonly".to_string()));
    assert!(tags.contains(&"network:allowed".to_string()));
    assert!(tags.contains(&"tool:blocked:BashTool".to_string()));
    assert!(tags.contains(&"command:blocked:rm".to_string()));
    assert!(!tags.contains(&"system:allowed".to_string()));
}

#[test]
fn test_specialization_operations() {
    assert!(AgentSpecialization::FileOperations
        .allowed_operations()
        .contains(&"fs:write"));
    assert!(!AgentSpecialization::General
        .allowed_operations()
        .contains(&"execute"));
    assert_eq!(AgentSpecialization::SystemAdmin.as_str(), "system-admin");
}

#[test]
fn test_specialization_serde_kebab() {
    let json = serde_json::to_string(&AgentSpecialization::FileOperations).unwrap();
    assert_eq!(json, "\"file-operations\"");
}

#[test]
fn test_permission_rule_builder() {
    let rule = PermissionRule::new(Role::User, ResourceType::File, AccessAction::Read)
        .with_path_pattern("/workspace/**");
    assert_eq!(rule.path_pattern.as_deref(), Some("/workspace/**"));
}

#[test]
fn test_check_result_factories() {
    let allow = PermissionCheckResult::allowed();
    assert!(allow.allowed);
    assert!(allow.reason.is_none());

    let deny = PermissionCheckResult::denied("No permission rule found", Some(Role::Guest));
    assert!(!deny.allowed);
    assert_eq!(deny.required_level, Some(Role::Guest));
}
