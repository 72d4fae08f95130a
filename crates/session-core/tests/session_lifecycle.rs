use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use session_core::mocks::{ChannelOutbound, MockCapture, MockNarrator, MockTranscriber};
use session_core::ports::{SessionError, SessionEvent};
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

/// Skip events until one matches the predicate; panics when the channel
/// closes first.
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

async fn wait_for_completion(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    loop {
        let event = rx.recv().await.expect("event channel closed");
        if matches!(event, SessionEvent::Completed(_)) {
            return event;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn full_three_question_session() {
    let mut h = harness(&["Tell me about yourself", "Why this role", "A challenge you faced"]);
    h.transcriber.push_ok("short");
    h.transcriber.push_ok("a longer answer with quite a few more words in it than the short one");
    h.transcriber.push_ok("medium length reply here with several words");

    h.controller.start().await.unwrap();

    for index in 0..3 {
        wait_for_state(&mut h.rx, |s| {
            matches!(s, SessionState::Recording { index: i, elapsed_secs: 0 } if *i == index)
        })
        .await;
        h.controller.stop_answer().await;
        wait_for_state(&mut h.rx, |s| {
            matches!(s, SessionState::Processing { index: i } if *i == index)
        })
        .await;
    }

    let SessionEvent::Completed(result) = wait_for_completion(&mut h.rx).await else {
        unreachable!()
    };
    assert_eq!(h.controller.state(), SessionState::Finished);
    assert_eq!(result.answers.len(), 3);
    assert_eq!(result.answers[0].transcript.as_deref(), Some("short"));
    assert!(result.answers[1].word_count() > result.answers[2].word_count());

    // Aggregate sits strictly between the weakest and strongest answer.
    let min = result.per_question.iter().cloned().fold(f64::MAX, f64::min);
    let max = result.per_question.iter().cloned().fold(f64::MIN, f64::max);
    assert!(result.aggregate > min && result.aggregate < max);

    // At most one narration and one open capture at any moment.
    assert!(h.narrator.max_in_flight.load(Ordering::SeqCst) <= 1);
    assert!(h.capture.max_open.load(Ordering::SeqCst) <= 1);
    assert_eq!(h.capture.open_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn questions_advance_in_order() {
    let mut h = harness(&["q0", "q1", "q2"]);
    h.controller.start().await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let state = wait_for_state(&mut h.rx, |s| {
            matches!(s, SessionState::Recording { elapsed_secs: 0, .. })
        })
        .await;
        if let SessionState::Recording { index, .. } = state {
            seen.push(index);
        }
        h.controller.stop_answer().await;
    }
    wait_for_completion(&mut h.rx).await;

    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn start_with_no_questions_fails() {
    let h = harness(&[]);
    let err = h.controller.start().await.unwrap_err();
    assert_eq!(err, SessionError::NoQuestions);
    assert_eq!(h.controller.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn narration_failure_still_reaches_recording() {
    let mut h = harness(&["q0", "q1"]);
    h.narrator.fail_on("q1");

    h.controller.start().await.unwrap();

    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;

    // Playback error on question 1 must not strand the session in Asking.
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 1, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;
    wait_for_completion(&mut h.rx).await;
}

#[tokio::test(start_paused = true)]
async fn unstopped_recording_hits_hard_timeout() {
    let mut h = harness(&["only question"]);
    h.transcriber.push_ok("timed out answer");

    h.controller.start().await.unwrap();

    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;

    // Never stop manually; the 60 second cap forces the transition.
    wait_for_state(&mut h.rx, |s| matches!(s, SessionState::Processing { index: 0 })).await;
    wait_for_completion(&mut h.rx).await;

    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.capture.open_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn transcription_failure_returns_to_idle() {
    let mut h = harness(&["q0", "q1"]);
    h.transcriber.push_err("service returned 500");

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;

    let mut failures = 0;
    loop {
        match h.rx.recv().await.expect("event channel closed") {
            SessionEvent::Failed(SessionError::Transcription(_)) => failures += 1,
            SessionEvent::StateChanged(SessionState::Idle) => break,
            SessionEvent::StateChanged(_) => {}
            other => panic!("unexpected event after failure: {:?}", other),
        }
    }

    assert_eq!(failures, 1);
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.controller.answers()[0].transcript, None);
}

#[tokio::test(start_paused = true)]
async fn capture_stop_failure_is_reported_as_a_capture_error() {
    let mut h = harness(&["q0"]);
    h.capture.fail_end_capture();

    h.controller.start().await.unwrap();
    wait_for_state(&mut h.rx, |s| {
        matches!(s, SessionState::Recording { index: 0, elapsed_secs: 0 })
    })
    .await;
    h.controller.stop_answer().await;

    // A device failure on stop is not a transcription error; nothing was
    // ever sent to the transcriber.
    loop {
        match h.rx.recv().await.expect("event channel closed") {
            SessionEvent::Failed(SessionError::CaptureFailed(_)) => break,
            SessionEvent::StateChanged(_) => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }
    wait_for_state(&mut h.rx, |s| s.is_idle()).await;
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn microphone_denied_is_fatal() {
    let mut h = harness(&["q0"]);
    h.capture.deny_microphone();

    h.controller.start().await.unwrap();

    loop {
        match h.rx.recv().await.expect("event channel closed") {
            SessionEvent::Failed(SessionError::MicrophoneUnavailable(_)) => break,
            SessionEvent::StateChanged(_) => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }
    wait_for_state(&mut h.rx, |s| s.is_idle()).await;
}
