//! In-crate test doubles for the ports. Used by the integration tests and
//! handy for demo wiring; they never touch real audio devices or the
//! network.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ports::{
    AudioClip, CancelToken, CaptureHandle, CapturePort, EvaluatorPort, NarratorPort,
    OutboundPort, SessionEvaluation, SessionEvent, TranscriberPort,
};
use crate::session::AnswerRecord;

/// Forwards session events into an mpsc channel for assertion.
#[derive(Clone)]
pub struct ChannelOutbound(pub mpsc::Sender<SessionEvent>);

#[async_trait]
impl OutboundPort for ChannelOutbound {
    async fn send(&self, event: SessionEvent) -> Result<()> {
        self.0
            .send(event)
            .await
            .map_err(|e| anyhow!(e.to_string()))
    }
}

/// Narrator that "plays" for a fixed delay. Questions whose text is
/// registered via [`fail_on`](Self::fail_on) resolve with an error instead,
/// after the same delay; a cancelled token also resolves as an error and
/// is counted separately.
pub struct MockNarrator {
    delay: Duration,
    fail_texts: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub speak_calls: AtomicUsize,
    pub cancelled_calls: AtomicUsize,
}

impl MockNarrator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_texts: Mutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            speak_calls: AtomicUsize::new(0),
            cancelled_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_on(&self, text: &str) {
        self.fail_texts.lock().unwrap().insert(text.to_string());
    }
}

#[async_trait]
impl NarratorPort for MockNarrator {
    async fn speak(&self, text: &str, cancel: CancelToken) -> Result<()> {
        self.speak_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            self.cancelled_calls.fetch_add(1, Ordering::SeqCst);
            return Err(anyhow!("narration cancelled"));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            self.cancelled_calls.fetch_add(1, Ordering::SeqCst);
            return Err(anyhow!("narration cancelled"));
        }
        if self.fail_texts.lock().unwrap().contains(text) {
            Err(anyhow!("simulated playback error"))
        } else {
            Ok(())
        }
    }
}

/// Capture service backed by counters instead of a device. Tracks how many
/// handles are open at once so tests can assert single-ownership.
pub struct MockCapture {
    available: AtomicBool,
    fail_end: AtomicBool,
    next_handle: AtomicU64,
    open: Mutex<HashSet<u64>>,
    pub max_open: AtomicUsize,
    pub aborted: AtomicUsize,
}

impl MockCapture {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            fail_end: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
            open: Mutex::new(HashSet::new()),
            max_open: AtomicUsize::new(0),
            aborted: AtomicUsize::new(0),
        }
    }

    pub fn deny_microphone(&self) {
        self.available.store(false, Ordering::SeqCst);
    }

    /// Make every subsequent `end_capture` fail after releasing the device.
    pub fn fail_end_capture(&self) {
        self.fail_end.store(true, Ordering::SeqCst);
    }

    pub fn open_handles(&self) -> usize {
        self.open.lock().unwrap().len()
    }
}

impl Default for MockCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapturePort for MockCapture {
    async fn begin_capture(&self) -> Result<CaptureHandle> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(anyhow!("microphone permission denied"));
        }
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let open_now = {
            let mut open = self.open.lock().unwrap();
            open.insert(id);
            open.len()
        };
        self.max_open.fetch_max(open_now, Ordering::SeqCst);
        Ok(CaptureHandle(id))
    }

    async fn end_capture(&self, handle: CaptureHandle) -> Result<AudioClip> {
        if !self.open.lock().unwrap().remove(&handle.0) {
            return Err(anyhow!("unknown capture handle {:?}", handle));
        }
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(anyhow!("input stream stopped unexpectedly"));
        }
        Ok(AudioClip {
            wav_bytes: vec![0u8; 64],
            sample_rate: 16_000,
            duration_ms: 1_000,
        })
    }

    async fn abort_capture(&self, handle: CaptureHandle) {
        self.open.lock().unwrap().remove(&handle.0);
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedResponse {
    delay: Duration,
    outcome: Result<String, String>,
}

/// Transcriber that replays a scripted queue of outcomes, each with its
/// own latency. An exhausted script yields empty transcripts.
pub struct MockTranscriber {
    script: Mutex<VecDeque<ScriptedResponse>>,
    pub calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_ok(&self, text: &str) {
        self.push_ok_after(text, Duration::from_millis(2));
    }

    pub fn push_ok_after(&self, text: &str, delay: Duration) {
        self.script.lock().unwrap().push_back(ScriptedResponse {
            delay,
            outcome: Ok(text.to_string()),
        });
    }

    pub fn push_err(&self, message: &str) {
        self.script.lock().unwrap().push_back(ScriptedResponse {
            delay: Duration::from_millis(2),
            outcome: Err(message.to_string()),
        });
    }
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriberPort for MockTranscriber {
    async fn transcribe(&self, _clip: AudioClip) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(response) => {
                tokio::time::sleep(response.delay).await;
                response.outcome.map_err(|message| anyhow!(message))
            }
            None => {
                tokio::time::sleep(Duration::from_millis(2)).await;
                Ok(String::new())
            }
        }
    }
}

/// Evaluator that returns a flat sub-score for every answer, or fails when
/// configured to.
pub struct MockEvaluator {
    pub fail: AtomicBool,
    pub overall: Mutex<Option<f64>>,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            overall: Mutex::new(None),
        }
    }
}

impl Default for MockEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvaluatorPort for MockEvaluator {
    async fn evaluate(&self, answers: &[AnswerRecord]) -> Result<SessionEvaluation> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("evaluation service unavailable"));
        }
        Ok(SessionEvaluation {
            per_answer: answers
                .iter()
                .map(|_| crate::session::AnswerEvaluation {
                    clarity: 6.0,
                    relevance: 6.0,
                    depth: 6.0,
                })
                .collect(),
            overall: *self.overall.lock().unwrap(),
        })
    }
}
