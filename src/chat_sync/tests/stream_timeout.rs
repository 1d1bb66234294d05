mod common;

use std::{sync::Arc, time::Duration};

use chat_sync::{
    Notification, TurnError,
    controller::{StreamController, StreamError, StreamState},
    resources::memory::{InMemoryStore, StoreOp},
    transport::ChatRequest,
};
use common::{Script, ScriptedTransport, llm, service, settle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const WINDOW: Duration = Duration::from_secs(50);

fn request() -> ChatRequest {
    ChatRequest {
        prompt: "slow question".into(),
        thread_id: "chat-1".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn silence_after_first_chunk_times_out_and_aborts_once() {
    let transport = ScriptedTransport::new(Script::Hang(vec![llm("thinking")]));
    let mut controller = StreamController::new(&*transport, WINDOW);

    let started = Instant::now();
    let mut events = 0;
    let err = controller
        .run(&request(), &CancellationToken::new(), |_| events += 1)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, StreamError::TimedOut(d) if d == WINDOW));
    assert_eq!(controller.state(), StreamState::TimedOut);
    assert_eq!(events, 1);
    assert!(elapsed >= WINDOW, "timed out early: {elapsed:?}");
    assert!(elapsed <= WINDOW + Duration::from_secs(1), "timed out late: {elapsed:?}");

    settle().await;
    assert_eq!(transport.aborts(), 1);
}

#[tokio::test(start_paused = true)]
async fn each_chunk_pushes_the_deadline_back() {
    let frames = vec![llm("a"), llm("b"), llm("c")];
    let transport = ScriptedTransport::new(Script::Slow(frames, Duration::from_secs(30)));
    let mut controller = StreamController::new(&*transport, WINDOW);

    let started = Instant::now();
    let summary = controller
        .run(&request(), &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(controller.state(), StreamState::Completed);
    assert_eq!(summary.events, 3);
    assert!(started.elapsed() >= Duration::from_secs(90));

    settle().await;
    assert_eq!(transport.aborts(), 0);
}

#[tokio::test(start_paused = true)]
async fn external_cancel_aborts_the_request() {
    let transport = ScriptedTransport::new(Script::Hang(vec![]));
    let cancel = CancellationToken::new();
    let mut controller = StreamController::new(&*transport, WINDOW);

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = controller.run(&request(), &cancel, |_| {}).await.unwrap_err();

    assert!(matches!(err, StreamError::Aborted));
    assert_eq!(controller.state(), StreamState::Aborted);
    assert!(started.elapsed() < WINDOW);
    settle().await;
    assert_eq!(transport.aborts(), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_turn_rolls_back_and_notifies() {
    let store = Arc::new(InMemoryStore::new());
    let transport = ScriptedTransport::new(Script::Hang(vec![llm("partial answer")]));
    let svc = service(&store, &transport);
    let mut rx = svc.notifier().subscribe();

    let err = svc.submit_message("chat-1", "slow question").await.unwrap_err();

    assert!(matches!(err, TurnError::Stream(StreamError::TimedOut(_))));
    assert!(svc.cache().messages("chat-1").is_empty());
    assert!(matches!(rx.try_recv().unwrap(), Notification::TurnFailed { .. }));
    assert!(store.calls_of(StoreOp::AppendMessages).is_empty());
}
