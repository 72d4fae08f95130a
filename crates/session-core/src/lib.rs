//! Headless interview session core: drives narration, microphone capture,
//! and transcription through port traits, one question at a time, and
//! aggregates the answers into a session score.
//!
//! The controller is the only owner of session state. Every async
//! completion it spawns carries the `(generation, index)` pair it was
//! issued for; a restart bumps the generation, so late results from a
//! previous run compare unequal and are discarded without touching state.

pub mod mocks;
pub mod ports;
pub mod scoring;
pub mod session;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ports::{
    CancelToken, CaptureHandle, CapturePort, EvaluatorPort, NarratorPort, OutboundPort,
    SessionError, SessionEvent, TranscriberPort,
};
use session::{AnswerRecord, SessionConfig, SessionResult, SessionState};

/// Finite-state controller for one voice interview simulation.
///
/// Commands (`start`, `stop_answer`, `restart`, `dispose`) and spawned
/// completions all funnel through the same guarded transition methods, so
/// the ordering guarantees hold regardless of which event fires first.
pub struct SessionController {
    questions: Vec<String>,
    config: SessionConfig,
    narrator: Arc<dyn NarratorPort>,
    capture: Arc<dyn CapturePort>,
    transcriber: Arc<dyn TranscriberPort>,
    evaluator: Option<Arc<dyn EvaluatorPort>>,
    outbound: Arc<dyn OutboundPort>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    generation: u64,
    session_id: Uuid,
    answers: Vec<AnswerRecord>,
    result: Option<SessionResult>,
    narrating: bool,
    recording: bool,
    narration_cancel: Option<CancelToken>,
    capture_handle: Option<CaptureHandle>,
    timers: TimerSet,
}

impl Inner {
    fn set_state(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }
}

#[derive(Default)]
struct TimerSet {
    countdown: Option<JoinHandle<()>>,
    elapsed: Option<JoinHandle<()>>,
    hard_stop: Option<JoinHandle<()>>,
    settle: Option<JoinHandle<()>>,
}

impl TimerSet {
    fn abort_recording(&mut self) {
        for handle in [self.elapsed.take(), self.hard_stop.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    fn abort_all(&mut self) {
        for handle in [
            self.countdown.take(),
            self.elapsed.take(),
            self.hard_stop.take(),
            self.settle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

enum CountdownStep {
    Continue,
    Advance,
    Stale,
}

impl SessionController {
    pub fn new(
        questions: Vec<String>,
        config: SessionConfig,
        narrator: Arc<dyn NarratorPort>,
        capture: Arc<dyn CapturePort>,
        transcriber: Arc<dyn TranscriberPort>,
        outbound: Arc<dyn OutboundPort>,
    ) -> Self {
        Self {
            questions,
            config,
            narrator,
            capture,
            transcriber,
            evaluator: None,
            outbound,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                generation: 0,
                session_id: Uuid::new_v4(),
                answers: Vec::new(),
                result: None,
                narrating: false,
                recording: false,
                narration_cancel: None,
                capture_handle: None,
                timers: TimerSet::default(),
            }),
        }
    }

    /// Attach the optional evaluation service before wrapping in `Arc`.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn EvaluatorPort>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    pub fn answers(&self) -> Vec<AnswerRecord> {
        self.inner.lock().unwrap().answers.clone()
    }

    pub fn result(&self) -> Option<SessionResult> {
        self.inner.lock().unwrap().result.clone()
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Begin a fresh session: countdown, then question 0.
    ///
    /// Fails with [`SessionError::NoQuestions`] on an empty question set;
    /// a start while a session is already running is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<(), SessionError> {
        if self.questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }

        let generation = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.state.is_idle() {
                warn!(state = %inner.state, "start ignored: session already active");
                return Ok(());
            }
            inner.session_id = Uuid::new_v4();
            inner.answers = vec![AnswerRecord::default(); self.questions.len()];
            inner.result = None;
            inner.set_state(SessionState::Countdown {
                remaining: self.config.countdown_secs,
            });
            inner.generation
        };

        info!(questions = self.questions.len(), "interview session starting");
        self.emit_state().await;
        self.spawn_countdown(generation);
        Ok(())
    }

    /// Manually end the answer currently being recorded. No-op outside
    /// `Recording`, and also before the microphone has actually opened.
    pub async fn stop_answer(self: &Arc<Self>) {
        let target = {
            let inner = self.inner.lock().unwrap();
            match inner.state {
                SessionState::Recording { index, .. } => Some((index, inner.generation)),
                _ => None,
            }
        };
        if let Some((index, generation)) = target {
            self.finish_recording(index, generation).await;
        }
    }

    /// Abort whatever is in flight and return to `Idle`. Safe to call from
    /// any state, any number of times.
    pub async fn restart(&self) {
        self.teardown().await;
    }

    /// Identical to [`restart`](Self::restart); named for callers that are
    /// done with the controller for good.
    pub async fn dispose(&self) {
        self.teardown().await;
    }

    async fn teardown(&self) {
        let (cancel, handle, was_active) = {
            let mut inner = self.inner.lock().unwrap();
            inner.generation += 1;
            inner.timers.abort_all();
            inner.narrating = false;
            inner.recording = false;
            inner.answers.clear();
            inner.result = None;
            let was_active = !inner.state.is_idle();
            inner.set_state(SessionState::Idle);
            (
                inner.narration_cancel.take(),
                inner.capture_handle.take(),
                was_active,
            )
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(handle) = handle {
            self.capture.abort_capture(handle).await;
        }
        if was_active {
            info!("session torn down");
            self.emit_state().await;
        }
    }

    fn spawn_countdown(self: &Arc<Self>, generation: u64) {
        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                match controller.countdown_tick(generation).await {
                    CountdownStep::Continue => {}
                    CountdownStep::Advance | CountdownStep::Stale => break,
                }
            }
        });

        let mut inner = self.inner.lock().unwrap();
        if inner.generation != generation {
            handle.abort();
            return;
        }
        inner.timers.countdown = Some(handle);
    }

    async fn countdown_tick(self: &Arc<Self>, generation: u64) -> CountdownStep {
        let step = {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation {
                return CountdownStep::Stale;
            }
            match inner.state {
                SessionState::Countdown { remaining } if remaining > 1 => {
                    inner.set_state(SessionState::Countdown {
                        remaining: remaining - 1,
                    });
                    CountdownStep::Continue
                }
                SessionState::Countdown { remaining } => {
                    if remaining > 0 {
                        inner.set_state(SessionState::Countdown { remaining: 0 });
                    }
                    CountdownStep::Advance
                }
                _ => return CountdownStep::Stale,
            }
        };
        match step {
            CountdownStep::Continue => self.emit_state().await,
            CountdownStep::Advance => {
                self.emit_state().await;
                self.begin_asking(0, generation).await;
            }
            CountdownStep::Stale => {}
        }
        step
    }

    /// Enter `Asking(index)` and narrate the question. Narration failure is
    /// non-fatal: the candidate can still answer, so both outcomes fall
    /// through to recording.
    async fn begin_asking(self: &Arc<Self>, index: usize, generation: u64) {
        let Some(text) = self.questions.get(index).cloned() else {
            return;
        };
        let cancel = {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation || inner.narrating {
                debug!(index, "asking discarded: stale or already narrating");
                return;
            }
            let valid_entry = match inner.state {
                SessionState::Countdown { .. } => index == 0,
                SessionState::Processing { index: prev } => prev + 1 == index,
                _ => false,
            };
            if !valid_entry {
                debug!(index, state = %inner.state, "asking discarded: wrong phase");
                return;
            }
            inner.set_state(SessionState::Asking { index });
            inner.narrating = true;
            // Registered under the lock so a teardown can cancel this
            // narration before its task has ever been polled.
            let cancel = CancelToken::new();
            inner.narration_cancel = Some(cancel.clone());
            cancel
        };
        self.emit_state().await;

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = controller.narrator.speak(&text, cancel).await {
                warn!(index, "narration failed, continuing to recording: {err:#}");
            }
            controller.narration_finished(index, generation).await;
        });
    }

    async fn narration_finished(self: &Arc<Self>, index: usize, generation: u64) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation
                || !matches!(inner.state, SessionState::Asking { index: i } if i == index)
            {
                debug!(index, "narration completion discarded");
                return;
            }
            inner.narrating = false;
            inner.narration_cancel = None;
        }
        self.begin_recording(index, generation).await;
    }

    /// Open the microphone and enter `Recording(index, 0)`. The state flips
    /// only once the device is live, so a stop command always has a capture
    /// handle to close.
    async fn begin_recording(self: &Arc<Self>, index: usize, generation: u64) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation
                || inner.recording
                || !matches!(inner.state, SessionState::Asking { index: i } if i == index)
            {
                debug!(index, "recording entry discarded");
                return;
            }
            inner.recording = true;
        }

        match self.capture.begin_capture().await {
            Ok(handle) => {
                let stale = {
                    let mut inner = self.inner.lock().unwrap();
                    if inner.generation == generation {
                        inner.capture_handle = Some(handle);
                        inner.set_state(SessionState::Recording {
                            index,
                            elapsed_secs: 0,
                        });
                        None
                    } else {
                        Some(handle)
                    }
                };
                if let Some(handle) = stale {
                    self.capture.abort_capture(handle).await;
                    return;
                }
                self.emit_state().await;
                self.spawn_recording_timers(index, generation);
            }
            Err(err) => {
                self.fail_session(
                    SessionError::MicrophoneUnavailable(format!("{err:#}")),
                    generation,
                )
                .await;
            }
        }
    }

    fn spawn_recording_timers(self: &Arc<Self>, index: usize, generation: u64) {
        let ticker = {
            let controller = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if !controller.recording_tick(index, generation).await {
                        break;
                    }
                }
            })
        };
        let hard_stop = {
            let controller = Arc::clone(self);
            let max = self.config.max_answer_duration();
            tokio::spawn(async move {
                tokio::time::sleep(max).await;
                controller.finish_recording(index, generation).await;
            })
        };

        let mut inner = self.inner.lock().unwrap();
        if inner.generation != generation {
            ticker.abort();
            hard_stop.abort();
            return;
        }
        inner.timers.elapsed = Some(ticker);
        inner.timers.hard_stop = Some(hard_stop);
    }

    async fn recording_tick(self: &Arc<Self>, index: usize, generation: u64) -> bool {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation {
                return false;
            }
            match inner.state {
                SessionState::Recording {
                    index: i,
                    elapsed_secs,
                } if i == index => {
                    inner.set_state(SessionState::Recording {
                        index,
                        elapsed_secs: elapsed_secs + 1,
                    });
                }
                _ => return false,
            }
        }
        self.emit_state().await;
        true
    }

    /// Shared exit from `Recording`, reached by manual stop and by the
    /// 60-second hard timeout. The `recording` flag makes the second
    /// arrival a no-op, so the two paths can never double-stop.
    async fn finish_recording(self: &Arc<Self>, index: usize, generation: u64) {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation
                || !inner.recording
                || !matches!(inner.state, SessionState::Recording { index: i, .. } if i == index)
            {
                debug!(index, "stop discarded: not recording this question");
                return;
            }
            let Some(handle) = inner.capture_handle.take() else {
                return;
            };
            inner.recording = false;
            inner.timers.abort_recording();
            inner.set_state(SessionState::Processing { index });
            handle
        };
        self.emit_state().await;

        let clip = match self.capture.end_capture(handle).await {
            Ok(clip) => clip,
            Err(err) => {
                self.fail_session(SessionError::CaptureFailed(format!("{err:#}")), generation)
                    .await;
                return;
            }
        };

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = controller.transcriber.transcribe(clip).await;
            controller
                .transcription_finished(index, generation, outcome)
                .await;
        });
    }

    async fn transcription_finished(
        self: &Arc<Self>,
        index: usize,
        generation: u64,
        outcome: anyhow::Result<String>,
    ) {
        let text = match outcome {
            Ok(text) => text,
            Err(err) => {
                self.fail_session(SessionError::Transcription(format!("{err:#}")), generation)
                    .await;
                return;
            }
        };

        let next = {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation
                || !matches!(inner.state, SessionState::Processing { index: i } if i == index)
            {
                debug!(index, "transcription result discarded");
                return;
            }
            if let Some(record) = inner.answers.get_mut(index) {
                record.transcript = Some(text);
            }
            if index + 1 < self.questions.len() {
                Some(index + 1)
            } else {
                None
            }
        };

        match next {
            Some(next_index) => self.schedule_next_question(next_index, generation),
            None => self.finish_session(generation).await,
        }
    }

    fn schedule_next_question(self: &Arc<Self>, next_index: usize, generation: u64) {
        let controller = Arc::clone(self);
        let settle = self.config.settle_delay();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            controller.begin_asking(next_index, generation).await;
        });

        let mut inner = self.inner.lock().unwrap();
        if inner.generation != generation {
            handle.abort();
            return;
        }
        inner.timers.settle = Some(handle);
    }

    /// Score the completed answer set and publish the terminal result.
    /// The local heuristic is computed first; the evaluation service may
    /// refine it, and its failure is absorbed.
    async fn finish_session(self: &Arc<Self>, generation: u64) {
        let (answers, session_id) = {
            let inner = self.inner.lock().unwrap();
            if inner.generation != generation {
                return;
            }
            (inner.answers.clone(), inner.session_id)
        };

        let breakdown = scoring::score(&answers);
        let mut aggregate = breakdown.aggregate;
        let mut evaluations = None;
        if let Some(evaluator) = &self.evaluator {
            match evaluator.evaluate(&answers).await {
                Ok(evaluation) => {
                    if let Some(overall) = evaluation.overall {
                        aggregate = overall.clamp(0.0, scoring::MAX_SCORE);
                    }
                    evaluations = Some(evaluation.per_answer);
                }
                Err(err) => {
                    warn!("evaluation service failed, keeping heuristic score: {err:#}");
                }
            }
        }

        let result = {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation
                || !matches!(inner.state, SessionState::Processing { .. })
            {
                return;
            }
            if let Some(per_answer) = evaluations {
                for (record, evaluation) in inner.answers.iter_mut().zip(per_answer) {
                    record.evaluation = Some(evaluation);
                }
            }
            let result = SessionResult {
                session_id,
                finished_at: Utc::now(),
                answers: inner.answers.clone(),
                aggregate,
                per_question: breakdown.per_question,
                coaching_notes: SessionResult::coaching_notes_for(aggregate),
            };
            inner.result = Some(result.clone());
            inner.set_state(SessionState::Finished);
            inner.timers.abort_all();
            result
        };

        info!(aggregate = result.aggregate, "interview session finished");
        self.emit_state().await;
        self.emit(SessionEvent::Completed(result)).await;
    }

    /// Fatal error path: surface the error exactly once and return to
    /// `Idle`. Bumps the generation so anything still in flight is orphaned.
    async fn fail_session(self: &Arc<Self>, error: SessionError, generation: u64) {
        let (cancel, handle) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.generation != generation {
                return;
            }
            inner.generation += 1;
            inner.timers.abort_all();
            inner.narrating = false;
            inner.recording = false;
            inner.set_state(SessionState::Idle);
            (inner.narration_cancel.take(), inner.capture_handle.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(handle) = handle {
            self.capture.abort_capture(handle).await;
        }

        warn!(%error, "session failed");
        self.emit(SessionEvent::Failed(error)).await;
        self.emit_state().await;
    }

    async fn emit_state(&self) {
        let state = self.state();
        self.emit(SessionEvent::StateChanged(state)).await;
    }

    async fn emit(&self, event: SessionEvent) {
        if let Err(err) = self.outbound.send(event).await {
            warn!("dropping outbound session event: {err:#}");
        }
    }
}
