use std::io::Cursor;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rodio::{Decoder, OutputStream, Sink, Source};

use session_core::ports::CancelToken;

use crate::synth::TtsAudio;

/// Play one synthesized clip to completion on a blocking thread, polling
/// the cancellation token. Returns once playback has finished or was
/// stopped.
///
/// The output stream lives inside the closure because rodio's stream
/// handle is not `Send`.
pub async fn play_interruptible(audio: TtsAudio, cancel: CancelToken) -> Result<()> {
    if audio.bytes.is_empty() {
        return Err(anyhow!("no audio data supplied for playback"));
    }

    tokio::task::spawn_blocking(move || {
        let (_stream, handle) =
            OutputStream::try_default().context("failed to create audio output stream")?;
        let sink = Sink::try_new(&handle).context("failed to create playback sink")?;

        let decoder = Decoder::new(Cursor::new(audio.bytes))
            .context("failed to decode synthesized audio")?;
        sink.append(decoder);

        while !sink.empty() {
            if cancel.is_cancelled() {
                sink.stop();
                return Err(anyhow!("playback interrupted"));
            }
            thread::sleep(Duration::from_millis(10));
        }

        Ok(())
    })
    .await
    .context("playback task panicked")?
}

/// Short sine cue played when the microphone opens. Failures are the
/// caller's to ignore; the cue is cosmetic.
pub struct BeepPlayer {
    _stream: OutputStream,
    handle: rodio::OutputStreamHandle,
}

impl BeepPlayer {
    pub fn new() -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("failed to create audio output stream")?;
        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    pub fn play(&self) -> Result<()> {
        let sink = Sink::try_new(&self.handle).context("failed to create beep sink")?;
        let source = rodio::source::SineWave::new(880.0)
            .take_duration(Duration::from_millis(160))
            .amplify(0.2);
        sink.append(source);
        sink.detach();
        Ok(())
    }
}
