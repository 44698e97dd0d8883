use super::*;
use pretty_assertions::assert_eq;
use qi_protocol::MessagePayload;
use qi_protocol::MessagePriority;

fn input(text: &str) -> Message {
    Message::user_input(text)
}

fn text_of(message: &Message) -> &str {
    match &message.payload {
        MessagePayload::UserInput { input } => input,
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_n_enqueues_then_done_yields_exactly_n() {
    let queue = MessageQueue::with_defaults();
    for i in 0..5 {
        queue.enqueue(input(&format!("m{i}"))).unwrap();
    }
    queue.done().unwrap();

    let mut iter = queue.iterate().unwrap();
    let mut seen = Vec::new();
    while let Some(message) = iter.next().await.unwrap() {
        seen.push(text_of(&message).to_string());
    }
    assert_eq!(seen, vec!["m0", "m1", "m2", "m3", "m4"]);

    // Completed iterator stays completed.
    assert_eq!(iter.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_equal_priority_is_fifo() {
    let queue = MessageQueue::with_defaults();
    let first = input("first");
    let second = input("second");
    queue.enqueue(first.clone()).unwrap();
    queue.enqueue(second.clone()).unwrap();
    queue.done().unwrap();

    let mut iter = queue.iterate().unwrap();
    assert_eq!(iter.next().await.unwrap().unwrap().id, first.id);
    assert_eq!(iter.next().await.unwrap().unwrap().id, second.id);
}

#[tokio::test]
async fn test_priority_ordering_drains_highest_first() {
    let queue = MessageQueue::with_defaults();
    queue
        .enqueue(input("low").with_priority(MessagePriority::Low))
        .unwrap();
    queue
        .enqueue(input("critical").with_priority(MessagePriority::Critical))
        .unwrap();
    queue
        .enqueue(input("normal").with_priority(MessagePriority::Normal))
        .unwrap();
    queue
        .enqueue(input("high").with_priority(MessagePriority::High))
        .unwrap();
    queue.done().unwrap();

    let mut iter = queue.iterate().unwrap();
    let mut order = Vec::new();
    while let Some(message) = iter.next().await.unwrap() {
        order.push(text_of(&message).to_string());
    }
    assert_eq!(order, vec!["critical", "high", "normal", "low"]);
}

#[tokio::test]
async fn test_fifo_when_priority_ordering_disabled() {
    let queue = MessageQueue::new(QueueOptions {
        priority_ordering: false,
        ..QueueOptions::default()
    });
    queue
        .enqueue(input("a").with_priority(MessagePriority::Low))
        .unwrap();
    queue
        .enqueue(input("b").with_priority(MessagePriority::Critical))
        .unwrap();
    queue.done().unwrap();

    let mut iter = queue.iterate().unwrap();
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "a");
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "b");
}

#[tokio::test]
async fn test_iterator_suspends_until_enqueue() {
    let queue = MessageQueue::with_defaults();
    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            queue.enqueue(input("late")).unwrap();
            queue.done().unwrap();
        })
    };

    let mut iter = queue.iterate().unwrap();
    let message = iter.next().await.unwrap().unwrap();
    assert_eq!(text_of(&message), "late");
    assert_eq!(iter.next().await.unwrap(), None);
    producer.await.unwrap();
}

#[tokio::test]
async fn test_second_iteration_fails_already_started() {
    let queue = MessageQueue::with_defaults();
    let _iter = queue.iterate().unwrap();
    let err = queue.iterate().err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::AlreadyStarted);
}

#[tokio::test]
async fn test_iteration_slot_released_on_drop() {
    let queue = MessageQueue::with_defaults();
    {
        let _iter = queue.iterate().unwrap();
    }
    assert!(queue.iterate().is_ok());
}

#[tokio::test]
async fn test_enqueue_after_done_fails_and_pending_drain() {
    let queue = MessageQueue::with_defaults();
    queue.enqueue(input("kept")).unwrap();
    queue.done().unwrap();

    let err = queue.enqueue(input("rejected")).err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::QueueDone);

    let mut iter = queue.iterate().unwrap();
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "kept");
    assert_eq!(iter.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_error_rejects_after_drain() {
    let queue = MessageQueue::with_defaults();
    queue.enqueue(input("pending")).unwrap();
    queue
        .error(QiError::system(
            qi_error::ErrorCode::SystemError,
            "provider blew up",
        ))
        .unwrap();

    let enqueue_err = queue.enqueue(input("rejected")).err().unwrap();
    assert_eq!(enqueue_err.code, qi_error::ErrorCode::QueueError);

    let mut iter = queue.iterate().unwrap();
    // Pending message still drains before the error surfaces.
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "pending");
    let err = iter.next().await.err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::SystemError);
}

#[tokio::test]
async fn test_max_size_backpressure() {
    let queue = MessageQueue::new(QueueOptions {
        max_size: Some(2),
        ..QueueOptions::default()
    });
    queue.enqueue(input("1")).unwrap();
    queue.enqueue(input("2")).unwrap();
    let err = queue.enqueue(input("3")).err().unwrap();
    assert_eq!(err.code, qi_error::ErrorCode::QueueFull);
    assert_eq!(queue.size(), 2);
}

#[tokio::test]
async fn test_expired_message_is_never_yielded() {
    let queue = MessageQueue::new(QueueOptions {
        message_ttl: Some(std::time::Duration::from_millis(10)),
        ..QueueOptions::default()
    });
    queue.enqueue(input("stale")).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    queue.enqueue(input("fresh")).unwrap();
    queue.done().unwrap();

    let mut iter = queue.iterate().unwrap();
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "fresh");
    assert_eq!(iter.next().await.unwrap(), None);
    assert_eq!(queue.stats().total_expired, 1);
}

#[tokio::test]
async fn test_peek_does_not_remove() {
    let queue = MessageQueue::with_defaults();
    queue.enqueue(input("head")).unwrap();
    assert_eq!(text_of(&queue.peek().unwrap()), "head");
    assert_eq!(queue.size(), 1);
}

#[tokio::test]
async fn test_pause_retains_order_and_resume_restores_delivery() {
    let queue = MessageQueue::with_defaults();
    queue.enqueue(input("a")).unwrap();
    queue.enqueue(input("b")).unwrap();
    queue.pause().unwrap();

    let resumer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            queue.resume().unwrap();
        })
    };

    let mut iter = queue.iterate().unwrap();
    // Suspended while paused even though messages are queued.
    let message = iter.next().await.unwrap().unwrap();
    assert_eq!(text_of(&message), "a");
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "b");
    resumer.await.unwrap();
}

#[tokio::test]
async fn test_destroy_completes_iterator_and_closes_queue() {
    let queue = MessageQueue::with_defaults();
    queue.enqueue(input("dropped")).unwrap();

    let mut iter = queue.iterate().unwrap();
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "dropped");

    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            queue.destroy();
        })
    };
    // Pending next() completes cleanly on destroy.
    assert_eq!(iter.next().await.unwrap(), None);
    waiter.await.unwrap();

    for err in [
        queue.enqueue(input("x")).err().unwrap(),
        queue.done().err().unwrap(),
        queue.pause().err().unwrap(),
        queue.resume().err().unwrap(),
        queue.clear().err().unwrap(),
    ] {
        assert_eq!(err.code, qi_error::ErrorCode::QueueDestroyed);
    }
}

#[tokio::test]
async fn test_destroy_invokes_cleanup_hook_once() {
    let queue = MessageQueue::with_defaults();
    let (tx, rx) = std::sync::mpsc::channel();
    queue.set_cleanup_hook(Box::new(move || {
        tx.send(()).ok();
    }));
    queue.destroy();
    queue.destroy();
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_stats_track_activity() {
    let queue = MessageQueue::with_defaults();
    queue.enqueue(input("a")).unwrap();
    queue.enqueue(input("b")).unwrap();

    let stats = queue.stats();
    assert_eq!(stats.total_enqueued, 2);
    assert_eq!(stats.current_size, 2);
    assert!(stats.last_activity_ms > 0);

    queue.done().unwrap();
    let mut iter = queue.iterate().unwrap();
    while iter.next().await.unwrap().is_some() {}
    let stats = queue.stats();
    assert_eq!(stats.total_delivered, 2);
    assert_eq!(stats.current_size, 0);
}

#[tokio::test]
async fn test_injection_during_iteration() {
    let queue = MessageQueue::with_defaults();
    queue.enqueue(input("first")).unwrap();

    let mut iter = queue.iterate().unwrap();
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "first");

    // Real-time injection while the iteration is live.
    queue.enqueue(input("injected")).unwrap();
    queue.done().unwrap();
    assert_eq!(text_of(&iter.next().await.unwrap().unwrap()), "injected");
    assert_eq!(iter.next().await.unwrap(), None);
}
