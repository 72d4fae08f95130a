//! Boundary traits the controller drives. Real adapters live in their own
//! crates (`capture`, `narrator`, `transcribe`, `evaluate`); tests use the
//! in-crate mocks.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::session::{AnswerRecord, SessionResult, SessionState};

/// Cancellation flag handed to exactly one narration. The controller
/// creates it under its lock before spawning the narration task, so a
/// teardown can always reach the narration it belongs to, even one that
/// has been queued but never polled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Opaque token for one in-flight microphone capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub u64);

/// One finished recording: WAV-encoded bytes plus enough metadata for the
/// caller to gate on clip length without re-parsing the container.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub wav_bytes: Vec<u8>,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

/// Microphone capture. Exclusive access to the input device between
/// `begin_capture` and `end_capture`/`abort_capture`; the device must be
/// released on every exit path.
#[async_trait]
pub trait CapturePort: Send + Sync {
    async fn begin_capture(&self) -> Result<CaptureHandle>;
    async fn end_capture(&self, handle: CaptureHandle) -> Result<AudioClip>;
    /// Release the device without producing a clip. Used on restart/dispose.
    async fn abort_capture(&self, handle: CaptureHandle);
}

/// Text-to-speech narration. `speak` resolves when playback has finished
/// (or failed), never synchronously. Cancelling the token makes the
/// paired `speak` resolve with an error, whether it is mid-playback or
/// has not started yet; the controller disregards the error via its
/// generation guard. Re-entrant `speak` while busy must be rejected.
#[async_trait]
pub trait NarratorPort: Send + Sync {
    async fn speak(&self, text: &str, cancel: CancelToken) -> Result<()>;
}

/// Speech-to-text over one recorded clip. Pure request/response; no retry
/// policy lives here.
#[async_trait]
pub trait TranscriberPort: Send + Sync {
    async fn transcribe(&self, clip: AudioClip) -> Result<String>;
}

/// Optional remote refinement over the local scoring heuristic.
#[async_trait]
pub trait EvaluatorPort: Send + Sync {
    async fn evaluate(&self, answers: &[AnswerRecord]) -> Result<SessionEvaluation>;
}

/// Result of one evaluation-service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvaluation {
    pub per_answer: Vec<crate::session::AnswerEvaluation>,
    /// Refined aggregate on a 0-10 scale, when the service supplies one.
    pub overall: Option<f64>,
}

/// Sink for session-level notifications (state changes, errors, the final
/// result). Delivery failures are logged and absorbed.
#[async_trait]
pub trait OutboundPort: Send + Sync {
    async fn send(&self, event: SessionEvent) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Failed(SessionError),
    Completed(SessionResult),
}

/// User-visible failures. Narration, evaluation, and stale-callback
/// conditions never surface here; they degrade or are discarded silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionError {
    NoQuestions,
    MicrophoneUnavailable(String),
    CaptureFailed(String),
    Transcription(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoQuestions => write!(f, "no questions available for this session"),
            SessionError::MicrophoneUnavailable(detail) => {
                write!(f, "microphone unavailable: {}", detail)
            }
            SessionError::CaptureFailed(detail) => {
                write!(f, "audio capture failed: {}", detail)
            }
            SessionError::Transcription(detail) => {
                write!(f, "transcription failed: {}", detail)
            }
        }
    }
}

impl std::error::Error for SessionError {}
