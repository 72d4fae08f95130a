use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use session_core::mocks::{ChannelOutbound, MockCapture, MockNarrator, MockTranscriber};
use session_core::ports::SessionEvent;
use session_core::session::{SessionConfig, SessionState};
use session_core::SessionController;

struct Harness {
    controller: Arc<SessionController>,
    narrator: Arc<MockNarrator>,
    capture: Arc<MockCapture>,
    transcriber: Arc<MockTranscriber>,
    rx: mpsc::Receiver<SessionEvent>,
}

fn harness(questions: &[&str]) -> Harness {
    let (tx, rx) = mpsc::channel(256);
    let narrator = Arc::new(MockNarrator::new(Duration::from_millis(20)));
    let capture = Arc::new(MockCapture::new());
    let transcriber = Arc::new(MockTranscriber::new());
    let config = SessionConfig {
        countdown_secs: 1,
        max_answer_secs: 60,
        settle_delay_ms: 5,
    };
    let controller = Arc::new(SessionController::new(
        questions.iter().map(|q| q.to_string()).collect(),
        config,
        narrator.clone(),
        capture.clone(),
        transcriber.clone(),
        Arc::new(ChannelOutbound(tx)),
    ));
    Harness {
        controller,
        narrator,
        capture,
        transcriber,
        rx,
    }
}

async fn wait_for_state(
    rx: &mut mpsc::Receiver<SessionEvent>,
    pred: impl Fn(&SessionState) -> bool,
) -> SessionState {
    loop {
        match rx.recv().await.expect("event channel closed") {
            SessionEvent::StateChanged(state) if pred(&state) => return state,
            _ => {}
        }
    }
}

fn drain(rx: &mut mpsc::Receiver<SessionEvent>) {
    while rx.try_recv().is_ok() {}
}

#[tokio::test(start_paused = true)]
async fn restart_mid_recording_starts_fresh() {
    let mut h = harness(&["q0", "q1"]);
    h.transcriber.push_ok("first answer of the old run");

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 1, elapsed_secs: 0 })
    })
    .await;

    h.controller.restart().await;
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.capture.open_handles(), 0);

    // A fresh start begins at question 0 with a clean answer set.
    h.controller.start().await.unwrap();
    assert!(h.controller.answers().iter().all(|a| a.transcript.is_none()));
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn dispose_is_idempotent_from_any_state() {
    let h = harness(&["q0"]);

    // From Idle: nothing to tear down, nothing to panic over.
    h.controller.dispose().await;
    h.controller.dispose().await;
    assert_eq!(h.controller.state(), SessionState::Idle);

    let mut h = harness(&["q0"]);
    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;

    h.controller.dispose().await;
    h.controller.dispose().await;
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.capture.open_handles(), 0);

    // No timer may fire after dispose.
    drain(&mut h.rx);
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert!(matches!(h.rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn double_dispose_after_finished_session() {
    let mut h = harness(&["q0"]);
    h.transcriber.push_ok("the only answer");

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;
    wait_for_state(&mut h.rx, |s| matches!(s, SessionState::Finished)).await;

    h.controller.dispose().await;
    h.controller.dispose().await;
    assert_eq!(h.controller.state(), SessionState::Idle);
    // No capture was live in Finished, so nothing should have been aborted.
    assert_eq!(h.capture.aborted.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_transcription_cannot_touch_new_session() {
    let mut h = harness(&["q0"]);
    h.transcriber
        .push_ok_after("ghost answer from the old run", Duration::from_secs(5));

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;
    wait_for_state(&mut h.rx, |s| matches!(s, SessionState::Processing { index: 0 })).await;

    // Restart while the transcription call is still outstanding.
    h.controller.restart().await;
    h.transcriber.push_ok("real answer");

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;
    wait_for_state(&mut h.rx, |s| matches!(s, SessionState::Finished)).await;

    let result = h.controller.result().expect("finished session has a result");
    assert_eq!(result.answers[0].transcript.as_deref(), Some("real answer"));
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn restart_during_narration_discards_completion() {
    let mut h = harness(&["a question that takes a while to narrate"]);

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| matches!(s, SessionState::Asking { index: 0 })).await;

    h.controller.restart().await;
    assert_eq!(h.controller.state(), SessionState::Idle);

    // The in-flight narration resolves eventually; it must resolve as
    // cancelled and must not push the controller into Recording.
    drain(&mut h.rx);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.capture.max_open.load(Ordering::SeqCst), 0);
    assert_eq!(h.narrator.cancelled_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_then_immediate_start_narrates_the_fresh_question() {
    let mut h = harness(&["q0"]);
    h.transcriber.push_ok("answer for the new run");

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| matches!(s, SessionState::Asking { index: 0 })).await;

    // Tear down while the first narration task is queued but not yet
    // polled, then start again without yielding in between.
    h.controller.restart().await;
    h.controller.start().await.unwrap();

    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;
    wait_for_state(&mut h.rx, |s| matches!(s, SessionState::Finished)).await;

    // The orphaned narration resolved as cancelled; the new session's
    // narration went through and reached recording.
    assert_eq!(h.narrator.speak_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.narrator.cancelled_calls.load(Ordering::SeqCst), 1);
    let result = h.controller.result().expect("finished session has a result");
    assert_eq!(
        result.answers[0].transcript.as_deref(),
        Some("answer for the new run")
    );
}

#[tokio::test(start_paused = true)]
async fn restart_clears_previous_result() {
    let mut h = harness(&["q0"]);
    h.transcriber.push_ok("the only answer");

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;
    wait_for_state(&mut h.rx, |s| matches!(s, SessionState::Finished)).await;
    assert!(h.controller.result().is_some());

    h.controller.restart().await;
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.controller.result().is_none());
    assert!(h.controller.answers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn restart_immediately_after_start_leaves_no_timers() {
    let mut h = harness(&["q0"]);

    h.controller.start().await.unwrap();
    h.controller.restart().await;
    assert_eq!(h.controller.state(), SessionState::Idle);

    drain(&mut h.rx);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(matches!(h.rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(h.capture.max_open.load(Ordering::SeqCst), 0);
}
