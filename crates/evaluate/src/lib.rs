//! Optional remote refinement of the local scoring heuristic: one
//! chat-completions call that grades every answer on clarity, relevance,
//! and depth. The session finishes on the heuristic alone when this
//! service is absent or failing.

pub mod extract;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use session_core::ports::{EvaluatorPort, SessionEvaluation};
use session_core::session::AnswerRecord;

const DEFAULT_BASE_URL: &str = "https://api.groq.com";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

const SYSTEM_PROMPT: &str = "You grade mock interview answers. Reply with JSON only: \
    {\"overall\": <0-10>, \"answers\": [{\"clarity\": <0-10>, \"relevance\": <0-10>, \
    \"depth\": <0-10>}, ...]} with one entry per answer, in order.";

/// Chat-completions backed [`EvaluatorPort`].
pub struct ChatEvaluator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatEvaluator {
    pub fn new(api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client for evaluation")?;

        let base_url = std::env::var("EVALUATE_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("EVALUATE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    fn user_prompt(answers: &[AnswerRecord]) -> String {
        let mut prompt = String::from("Candidate answers:\n");
        for (i, answer) in answers.iter().enumerate() {
            let text = answer.transcript.as_deref().unwrap_or("(no answer)");
            prompt.push_str(&format!("{}. {}\n", i + 1, text));
        }
        prompt
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/openai/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.0,
            "response_format": { "type": "json_object" }
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("evaluation request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "evaluation endpoint {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let v: Value = response.json().await.context("invalid evaluation json")?;
        let content = v
            .pointer("/choices/0/message/content")
            .and_then(|x| x.as_str())
            .ok_or_else(|| anyhow!("missing choices[0].message.content"))?;
        Ok(content.to_string())
    }
}

#[async_trait]
impl EvaluatorPort for ChatEvaluator {
    async fn evaluate(&self, answers: &[AnswerRecord]) -> Result<SessionEvaluation> {
        let reply = self.chat(&Self::user_prompt(answers)).await?;
        let evaluation = extract::parse_evaluation(&reply, answers.len())?;
        debug!(overall = ?evaluation.overall, "evaluation parsed");
        Ok(evaluation)
    }
}
