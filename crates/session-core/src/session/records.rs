use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-question outcome, written once per pipeline step:
/// recorded -> transcribed -> (optionally) evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Transcribed answer text. `None` until transcription succeeds for
    /// this index; never fabricated on failure.
    pub transcript: Option<String>,
    /// Sub-scores filled in by the evaluation service after the final
    /// question; absent when the service is disabled or fails.
    pub evaluation: Option<AnswerEvaluation>,
}

impl AnswerRecord {
    pub fn word_count(&self) -> usize {
        self.transcript
            .as_deref()
            .map(|t| t.split_whitespace().count())
            .unwrap_or(0)
    }
}

/// Per-category sub-scores on a 0-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvaluation {
    pub clarity: f64,
    pub relevance: f64,
    pub depth: f64,
}

impl AnswerEvaluation {
    pub fn mean(&self) -> f64 {
        (self.clarity + self.relevance + self.depth) / 3.0
    }
}

/// Terminal snapshot of one completed session. Created once on entering
/// `Finished`, immutable until a restart clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub answers: Vec<AnswerRecord>,
    /// Aggregate score in [0, 10]. The local word-count heuristic unless
    /// the evaluation service refined it.
    pub aggregate: f64,
    pub per_question: Vec<f64>,
    pub coaching_notes: String,
}

impl SessionResult {
    pub fn coaching_notes_for(aggregate: f64) -> String {
        if aggregate < 4.0 {
            "Needs practice: answers were short. Aim for structured, \
             two to three sentence responses with a concrete example."
                .to_string()
        } else if aggregate <= 7.0 {
            "Developing: solid length overall. Focus on tightening the \
             weakest answers and leading with the outcome."
                .to_string()
        } else {
            "Strong: well-developed answers throughout. Polish delivery \
             and keep responses under a minute."
                .to_string()
        }
    }
}
