//! Question narration adapter: synthesize one question, play it aloud, and
//! resolve when playback ends. Each `speak` is paired with the
//! [`CancelToken`] its caller created; cancelling the token aborts that
//! narration whether it is mid-playback or has not been polled yet.

pub mod playback;
pub mod synth;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use session_core::ports::{CancelToken, NarratorPort};
use synth::TtsBackend;

pub use playback::BeepPlayer;
pub use synth::{HttpTtsBackend, TtsAudio};

/// [`NarratorPort`] over an HTTP TTS backend and local audio output.
pub struct TtsNarrator {
    backend: Arc<dyn TtsBackend>,
    busy: AtomicBool,
}

impl TtsNarrator {
    pub fn new(backend: Arc<dyn TtsBackend>) -> Self {
        Self {
            backend,
            busy: AtomicBool::new(false),
        }
    }

    async fn speak_inner(&self, text: &str, cancel: CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(anyhow!("narration cancelled"));
        }
        let audio = self.backend.synthesize(text).await?;
        if cancel.is_cancelled() {
            return Err(anyhow!("narration cancelled"));
        }
        playback::play_interruptible(audio, cancel).await
    }
}

#[async_trait]
impl NarratorPort for TtsNarrator {
    async fn speak(&self, text: &str, cancel: CancelToken) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("narration already in progress"));
        }

        debug!(voice = self.backend.voice(), "narrating question");
        let result = self.speak_inner(text, cancel).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }
}

/// System-voice fallback via `/usr/bin/say`, for running without TTS
/// credentials. Cancellation kills the child process; a token cancelled
/// before the child is spawned prevents the spawn entirely.
#[cfg(target_os = "macos")]
pub struct SayNarrator {
    rate_wpm: u32,
    busy: AtomicBool,
}

#[cfg(target_os = "macos")]
impl SayNarrator {
    pub fn new() -> Self {
        Self {
            rate_wpm: 200,
            busy: AtomicBool::new(false),
        }
    }

    async fn speak_inner(&self, text: &str, cancel: CancelToken) -> Result<()> {
        use anyhow::Context;

        if cancel.is_cancelled() {
            return Err(anyhow!("narration cancelled"));
        }

        let mut child = std::process::Command::new("/usr/bin/say")
            .arg("-r")
            .arg(self.rate_wpm.to_string())
            .arg(text)
            .spawn()
            .context("failed to spawn macOS say")?;

        loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!("narration cancelled"));
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(anyhow!("say exited with {status}"));
                }
                Ok(None) => {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(target_os = "macos")]
impl Default for SayNarrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
#[async_trait]
impl NarratorPort for SayNarrator {
    async fn speak(&self, text: &str, cancel: CancelToken) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("narration already in progress"));
        }
        let result = self.speak_inner(text, cancel).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }
}
