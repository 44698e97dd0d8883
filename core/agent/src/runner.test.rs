use super::*;
use crate::orchestrator::AgentOrchestrator;
use pretty_assertions::assert_eq;
use qi_inference::StaticProvider;
use qi_protocol::Message;
use std::sync::Mutex;

#[derive(Default)]
struct RecordingUi {
    events: Mutex<Vec<UiEvent>>,
    busy_changes: Mutex<Vec<bool>>,
}

impl RecordingUi {
    fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl UserInterface for RecordingUi {
    fn emit(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn set_mode(&self, _mode: UiMode) {}

    fn set_busy(&self, busy: bool) {
        self.busy_changes.lock().unwrap().push(busy);
    }
}

fn runner_fixture(
    provider: Arc<StaticProvider>,
) -> (AgentRunner, Arc<MessageQueue>, Arc<RecordingUi>) {
    let queue = MessageQueue::with_defaults();
    let orchestrator = AgentOrchestrator::builder()
        .provider(provider)
        .queue(queue.clone())
        .build()
        .unwrap();
    let ui = Arc::new(RecordingUi::default());
    let runner = AgentRunner::new(orchestrator, queue.clone(), ui.clone());
    (runner, queue, ui)
}

#[tokio::test]
async fn test_exit_terminates_loop() {
    let (runner, queue, _ui) = runner_fixture(Arc::new(StaticProvider::new("static-1")));
    queue.enqueue(Message::user_input("/exit")).unwrap();
    // No done() needed: the exit input breaks the loop.
    runner.run().await.unwrap();
}

#[tokio::test]
async fn test_prompt_flow_reaches_ui_as_chunks_then_complete() {
    let provider = Arc::new(StaticProvider::new("static-1"));
    provider.push_reply(["Rec", "ursion", " is elegant"]);
    let (runner, queue, ui) = runner_fixture(provider);

    queue.enqueue(Message::user_input("Explain recursion")).unwrap();
    // Exit only after the prompt's output has drained through the bus.
    let closer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            queue.enqueue(Message::user_input("/quit")).unwrap();
        })
    };
    runner.run().await.unwrap();
    closer.await.unwrap();

    let events = ui.events();
    let chunks: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            UiEvent::StreamingChunk { content } => Some(content.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["Rec", "ursion", " is elegant"]);

    let complete_position = events
        .iter()
        .position(|event| matches!(event, UiEvent::StreamingComplete))
        .unwrap();
    let last_chunk_position = events
        .iter()
        .rposition(|event| matches!(event, UiEvent::StreamingChunk { .. }))
        .unwrap();
    assert!(complete_position > last_chunk_position);

    // The final agent output message follows the stream.
    assert!(events.iter().any(|event| matches!(
        event,
        UiEvent::MessageReceived { message }
            if matches!(message.payload, MessagePayload::AgentOutput { .. })
    )));
}

#[tokio::test]
async fn test_abort_control_surfaces_cancelled() {
    let (runner, queue, ui) = runner_fixture(Arc::new(StaticProvider::new("static-1")));
    queue
        .enqueue(Message::system_control(ControlAction::Abort))
        .unwrap();
    queue.enqueue(Message::user_input("/exit")).unwrap();
    runner.run().await.unwrap();

    assert!(ui
        .events()
        .iter()
        .any(|event| matches!(event, UiEvent::Cancelled)));
}

#[tokio::test]
async fn test_shutdown_control_breaks_loop() {
    let (runner, queue, _ui) = runner_fixture(Arc::new(StaticProvider::new("static-1")));
    queue
        .enqueue(Message::system_control(ControlAction::Shutdown))
        .unwrap();
    runner.run().await.unwrap();
}

#[tokio::test]
async fn test_command_message_dispatches() {
    let (runner, queue, ui) = runner_fixture(Arc::new(StaticProvider::new("static-1")));
    queue
        .enqueue(Message::command("status", vec![]))
        .unwrap();
    let closer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            queue.enqueue(Message::user_input("/exit")).unwrap();
        })
    };
    runner.run().await.unwrap();
    closer.await.unwrap();

    let saw_status_output = ui.events().iter().any(|event| matches!(
        event,
        UiEvent::MessageReceived { message }
            if matches!(&message.payload, MessagePayload::AgentOutput { content }
                if content.contains("Status:"))
    ));
    assert!(saw_status_output);
}
