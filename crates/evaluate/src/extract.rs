//! Defensive parsing of the evaluation model's JSON reply. Models drift;
//! missing or malformed fields degrade to neutral values rather than
//! failing the whole evaluation.

use anyhow::{anyhow, Result};
use serde_json::Value;

use session_core::ports::SessionEvaluation;
use session_core::session::AnswerEvaluation;

const NEUTRAL_SCORE: f64 = 5.0;

/// Parse `{ "overall": n, "answers": [{ "clarity": n, "relevance": n,
/// "depth": n }, ...] }`, clamping every score to [0, 10].
pub fn parse_evaluation(json_str: &str, expected_answers: usize) -> Result<SessionEvaluation> {
    let json: Value = serde_json::from_str(json_str)?;

    let answers = json
        .get("answers")
        .and_then(|a| a.as_array())
        .ok_or_else(|| anyhow!("missing answers array"))?;

    if answers.len() != expected_answers {
        return Err(anyhow!(
            "evaluation covered {} answers, expected {}",
            answers.len(),
            expected_answers
        ));
    }

    let per_answer = answers
        .iter()
        .map(|entry| AnswerEvaluation {
            clarity: score_field(entry, "clarity"),
            relevance: score_field(entry, "relevance"),
            depth: score_field(entry, "depth"),
        })
        .collect();

    let overall = json
        .get("overall")
        .and_then(|v| v.as_f64())
        .map(|v| v.clamp(0.0, 10.0));

    Ok(SessionEvaluation {
        per_answer,
        overall,
    })
}

fn score_field(entry: &Value, field: &str) -> f64 {
    entry
        .get(field)
        .and_then(|v| v.as_f64())
        .map(|v| v.clamp(0.0, 10.0))
        .unwrap_or(NEUTRAL_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_reply() {
        let reply = r#"{
            "overall": 7.5,
            "answers": [
                { "clarity": 8, "relevance": 7, "depth": 6 },
                { "clarity": 9, "relevance": 8, "depth": 7 }
            ]
        }"#;
        let parsed = parse_evaluation(reply, 2).unwrap();
        assert_eq!(parsed.overall, Some(7.5));
        assert_eq!(parsed.per_answer.len(), 2);
        assert_eq!(parsed.per_answer[0].clarity, 8.0);
    }

    #[test]
    fn missing_fields_fall_back_to_neutral() {
        let reply = r#"{ "answers": [ { "clarity": 8 } ] }"#;
        let parsed = parse_evaluation(reply, 1).unwrap();
        assert_eq!(parsed.overall, None);
        assert_eq!(parsed.per_answer[0].relevance, NEUTRAL_SCORE);
        assert_eq!(parsed.per_answer[0].depth, NEUTRAL_SCORE);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let reply = r#"{ "overall": 42, "answers": [ { "clarity": -3, "relevance": 15, "depth": 5 } ] }"#;
        let parsed = parse_evaluation(reply, 1).unwrap();
        assert_eq!(parsed.overall, Some(10.0));
        assert_eq!(parsed.per_answer[0].clarity, 0.0);
        assert_eq!(parsed.per_answer[0].relevance, 10.0);
    }

    #[test]
    fn wrong_answer_count_is_an_error() {
        let reply = r#"{ "answers": [] }"#;
        assert!(parse_evaluation(reply, 2).is_err());
    }

    #[test]
    fn non_json_reply_is_an_error() {
        assert!(parse_evaluation("Sure! Here are the scores:", 1).is_err());
    }
}
