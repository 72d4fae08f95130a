//! Terminal front end: wires the live adapters into the session controller
//! and drives one interview from stdin commands.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use capture::MicCapture;
use evaluate::ChatEvaluator;
use narrator::{BeepPlayer, HttpTtsBackend, TtsNarrator};
use session_core::ports::{
    AudioClip, NarratorPort, OutboundPort, SessionEvent, TranscriberPort,
};
use session_core::session::{SessionResult, SessionState};
use session_core::SessionController;
use transcribe::WhisperTranscriber;

use crate::config;
use crate::constants::{messages, prefixes, MIN_CLIP_MS};
use crate::logger;

/// Forwards controller events into the terminal loop's channel.
struct EventBridge(mpsc::UnboundedSender<SessionEvent>);

#[async_trait]
impl OutboundPort for EventBridge {
    async fn send(&self, event: SessionEvent) -> Result<()> {
        self.0
            .send(event)
            .map_err(|_| anyhow!("event receiver is gone"))
    }
}

/// Short-circuits clips too brief to contain speech so we never pay for a
/// transcription round trip on an accidental double-tap.
struct GuardedTranscriber<T> {
    inner: T,
}

#[async_trait]
impl<T: TranscriberPort> TranscriberPort for GuardedTranscriber<T> {
    async fn transcribe(&self, clip: AudioClip) -> Result<String> {
        if clip.duration_ms < MIN_CLIP_MS {
            logger::log_event("CAPTURE", messages::NO_AUDIO);
            return Ok(String::new());
        }
        self.inner.transcribe(clip).await
    }
}

enum UserCommand {
    StopAnswer,
    Restart,
    Quit,
}

/// Reads stdin on its own thread; Enter stops the current answer.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<UserCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let command = match line.trim() {
                "" | "s" => UserCommand::StopAnswer,
                "r" => UserCommand::Restart,
                "q" => UserCommand::Quit,
                other => {
                    println!("unrecognized command: {other}");
                    continue;
                }
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });
    rx
}

fn build_narrator(api_key: &str) -> Result<Arc<dyn NarratorPort>> {
    #[cfg(target_os = "macos")]
    if std::env::var("USE_SYSTEM_VOICE").is_ok() {
        return Ok(Arc::new(narrator::SayNarrator::new()));
    }
    let backend = HttpTtsBackend::new(api_key.to_string())?;
    Ok(Arc::new(TtsNarrator::new(Arc::new(backend))))
}

pub async fn run(questions: Vec<String>, api_key: String) -> Result<()> {
    let question_texts = questions.clone();

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let narrator = build_narrator(&api_key)?;
    let capture = Arc::new(MicCapture::new()?);
    let transcriber = Arc::new(GuardedTranscriber {
        inner: WhisperTranscriber::new(api_key.clone())?,
    });

    let mut controller = SessionController::new(
        questions,
        config::load_session_config(),
        narrator,
        capture,
        transcriber,
        Arc::new(EventBridge(events_tx)),
    );
    match ChatEvaluator::new(api_key) {
        Ok(evaluator) => controller = controller.with_evaluator(Arc::new(evaluator)),
        Err(err) => warn!("running without the evaluation service: {err:#}"),
    }
    let controller = Arc::new(controller);

    // The cue is cosmetic; run without it if the output device is busy.
    let beep = match BeepPlayer::new() {
        Ok(beep) => Some(beep),
        Err(err) => {
            warn!("recording cue disabled: {err:#}");
            None
        }
    };

    let mut commands = spawn_stdin_reader();

    println!(
        "{} question(s) loaded. Enter stops an answer, 'r' restarts, 'q' quits.",
        controller.question_count()
    );
    controller.start().await?;

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if handle_event(event, &question_texts, beep.as_ref()) {
                    break;
                }
            }
            command = commands.recv() => match command {
                Some(UserCommand::StopAnswer) => controller.stop_answer().await,
                Some(UserCommand::Restart) => {
                    controller.restart().await;
                    logger::log_event("SESSION", "restarted by user");
                    controller.start().await?;
                }
                Some(UserCommand::Quit) | None => {
                    controller.dispose().await;
                    logger::log_event("SESSION", messages::SESSION_ABORTED);
                    break;
                }
            },
        }
    }

    Ok(())
}

/// Returns `true` once the session has produced its final result.
fn handle_event(event: SessionEvent, questions: &[String], beep: Option<&BeepPlayer>) -> bool {
    match event {
        SessionEvent::StateChanged(state) => {
            logger::log_event("STATE", &state.to_string());
            match state {
                SessionState::Countdown { remaining } if remaining > 0 => {
                    println!("Starting in {remaining}...");
                }
                SessionState::Asking { index } => {
                    let text = questions.get(index).map(String::as_str).unwrap_or("");
                    println!("{} Q{}: {}", prefixes::ASK, index + 1, text);
                }
                SessionState::Recording {
                    index,
                    elapsed_secs: 0,
                } => {
                    if let Some(beep) = beep {
                        let _ = beep.play();
                    }
                    println!(
                        "{} answer {} recording (Enter to stop)",
                        prefixes::REC,
                        index + 1
                    );
                }
                SessionState::Recording { elapsed_secs, .. } if elapsed_secs % 10 == 0 => {
                    println!("{} {elapsed_secs}s elapsed", prefixes::REC);
                }
                SessionState::Processing { index } => {
                    println!("{} transcribing answer {}", prefixes::PROC, index + 1);
                }
                _ => {}
            }
            false
        }
        SessionEvent::Failed(error) => {
            logger::log_error("SESSION", &error.to_string());
            println!("{} {error} ('r' to retry, 'q' to quit)", prefixes::WARN);
            false
        }
        SessionEvent::Completed(result) => {
            print_result(&result);
            true
        }
    }
}

fn print_result(result: &SessionResult) {
    println!();
    println!("{} overall {:.1}/10", prefixes::SCORE, result.aggregate);
    for (i, (record, score)) in result
        .answers
        .iter()
        .zip(&result.per_question)
        .enumerate()
    {
        let transcript = record.transcript.as_deref().unwrap_or("(no answer)");
        println!("  Q{}: {:.1}  {}", i + 1, score, truncate(transcript, 72));
        if let Some(evaluation) = &record.evaluation {
            println!(
                "       clarity {:.1} / relevance {:.1} / depth {:.1}",
                evaluation.clarity, evaluation.relevance, evaluation.depth
            );
        }
    }
    println!("  {}", result.coaching_notes);
    logger::log_event("RESULT", &format!("aggregate {:.2}", result.aggregate));
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}
