//! Local scoring heuristic: answer length normalized against an expected
//! word count. Deliberately simple and replaceable; the load-bearing
//! contract is that it is pure and deterministic, so the evaluation
//! service can refine it but never needs to exist for a session to finish.

use crate::session::AnswerRecord;

/// Reference length for a fully developed spoken answer.
const EXPECTED_WORDS: f64 = 60.0;

pub const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub aggregate: f64,
    pub per_question: Vec<f64>,
}

/// Score a full answer set. Empty or missing transcripts score zero;
/// answers at or beyond the reference length saturate at [`MAX_SCORE`].
pub fn score(answers: &[AnswerRecord]) -> ScoreBreakdown {
    let per_question: Vec<f64> = answers.iter().map(score_answer).collect();
    let aggregate = if per_question.is_empty() {
        0.0
    } else {
        per_question.iter().sum::<f64>() / per_question.len() as f64
    };
    ScoreBreakdown {
        aggregate: clamp(aggregate),
        per_question,
    }
}

fn score_answer(answer: &AnswerRecord) -> f64 {
    let words = answer.word_count() as f64;
    clamp(words / EXPECTED_WORDS * MAX_SCORE)
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, MAX_SCORE)
}
