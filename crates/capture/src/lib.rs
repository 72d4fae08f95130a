//! Microphone capture adapter. cpal streams are not `Send`, so a dedicated
//! audio thread owns the recorder and the async side talks to it over a
//! command channel.

pub mod recorder;
pub mod wav;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use recorder::Recorder;
use session_core::ports::{AudioClip, CaptureHandle, CapturePort};

enum Command {
    Begin {
        reply: oneshot::Sender<Result<CaptureHandle>>,
    },
    End {
        handle: CaptureHandle,
        reply: oneshot::Sender<Result<AudioClip>>,
    },
    Abort {
        handle: CaptureHandle,
        reply: oneshot::Sender<()>,
    },
}

/// [`CapturePort`] implementation over the default input device. At most
/// one capture may be live at a time; a second `begin_capture` fails until
/// the first is ended or aborted.
pub struct MicCapture {
    commands: mpsc::UnboundedSender<Command>,
}

impl MicCapture {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || worker_loop(rx))
            .context("failed to spawn capture thread")?;
        Ok(Self { commands: tx })
    }
}

#[async_trait]
impl CapturePort for MicCapture {
    async fn begin_capture(&self) -> Result<CaptureHandle> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Begin { reply })
            .map_err(|_| anyhow!("capture thread is gone"))?;
        response.await.context("capture thread dropped the request")?
    }

    async fn end_capture(&self, handle: CaptureHandle) -> Result<AudioClip> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::End { handle, reply })
            .map_err(|_| anyhow!("capture thread is gone"))?;
        response.await.context("capture thread dropped the request")?
    }

    async fn abort_capture(&self, handle: CaptureHandle) {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Abort { handle, reply }).is_ok() {
            let _ = response.await;
        }
    }
}

fn worker_loop(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut active: Option<(CaptureHandle, Recorder)> = None;
    let mut next_id: u64 = 1;

    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Begin { reply } => {
                let outcome = if active.is_some() {
                    Err(anyhow!("a capture is already in progress"))
                } else {
                    Recorder::open().map(|recorder| {
                        recorder.start();
                        let handle = CaptureHandle(next_id);
                        next_id += 1;
                        active = Some((handle, recorder));
                        debug!(?handle, "microphone capture started");
                        handle
                    })
                };
                let _ = reply.send(outcome);
            }
            Command::End { handle, reply } => {
                let outcome = match active.take() {
                    Some((current, recorder)) if current == handle => finish(recorder),
                    Some(other) => {
                        // Unknown handle: keep the live capture untouched.
                        active = Some(other);
                        Err(anyhow!("no capture in progress for {:?}", handle))
                    }
                    None => Err(anyhow!("no capture in progress")),
                };
                let _ = reply.send(outcome);
            }
            Command::Abort { handle, reply } => {
                match active.take() {
                    Some((current, recorder)) if current == handle => {
                        drop(recorder);
                        debug!(?handle, "microphone capture aborted");
                    }
                    Some(other) => active = Some(other),
                    None => {}
                }
                let _ = reply.send(());
            }
        }
    }

    if active.is_some() {
        warn!("capture thread exiting with a live recording; releasing device");
    }
}

fn finish(recorder: Recorder) -> Result<AudioClip> {
    let samples = recorder.stop()?;
    let input_rate = recorder.input_sample_rate();
    // Dropping the recorder pauses the stream and releases the device.
    drop(recorder);

    let wav_bytes = wav::encode(&samples, input_rate)?;
    Ok(AudioClip {
        duration_ms: wav::duration_ms(samples.len(), input_rate),
        sample_rate: wav::TARGET_SAMPLE_RATE,
        wav_bytes,
    })
}
