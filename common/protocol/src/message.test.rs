use super::*;
use crate::tool::ExecutionPhase;
use pretty_assertions::assert_eq;

#[test]
fn test_type_derived_from_payload() {
    assert_eq!(
        Message::user_input("hello").message_type(),
        MessageType::UserInput
    );
    assert_eq!(
        Message::command("status", vec![]).message_type(),
        MessageType::Command
    );
    assert_eq!(
        Message::stream_chunk("abc", false).message_type(),
        MessageType::StreamChunk
    );
}

#[test]
fn test_default_priorities() {
    assert_eq!(Message::user_input("x").priority, MessagePriority::Normal);
    assert_eq!(Message::command("x", vec![]).priority, MessagePriority::High);
    assert_eq!(
        Message::system_control(ControlAction::Abort).priority,
        MessagePriority::Critical
    );
}

#[test]
fn test_priority_ordering() {
    assert!(MessagePriority::Critical > MessagePriority::High);
    assert!(MessagePriority::High > MessagePriority::Normal);
    assert!(MessagePriority::Normal > MessagePriority::Low);
    assert_eq!(MessagePriority::Low.lane(), 0);
    assert_eq!(MessagePriority::Critical.lane(), 3);
    assert_eq!(MessagePriority::DRAIN_ORDER[0], MessagePriority::Critical);
}

#[test]
fn test_progress_message_carries_correlation() {
    let update = ProgressUpdate {
        call_id: "call-9".to_string(),
        phase: ExecutionPhase::Validation,
        progress: 0.4,
        message: "Validating input".to_string(),
    };
    let msg = Message::progress(update);
    assert_eq!(msg.correlation_id.as_deref(), Some("call-9"));
    assert_eq!(msg.message_type(), MessageType::Progress);
}

#[test]
fn test_unique_ids_and_timestamps() {
    let a = Message::user_input("a");
    let b = Message::user_input("b");
    assert_ne!(a.id, b.id);
    assert!(a.timestamp > 0);
    assert!(a.age_ms(a.timestamp + 50) == 50);
}

#[test]
fn test_serde_tagging() {
    let msg = Message::user_input("hi").with_correlation("req-1");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"type\":\"user_input\""));
    let parsed: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, msg);
}
