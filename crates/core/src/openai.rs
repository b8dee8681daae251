use crate::audio::AudioClip;
use crate::oracle::{EvaluationOracle, OracleError, QuestionOracle, Transcriber};
use crate::prompts::{PromptSet, render};
use crate::report::format_transcript;
use crate::session::{InterviewConfig, Turn};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Rough interview length suggested to the model before it should close.
pub const SUGGESTED_QUESTION_COUNT: usize = 6;

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    /// Null when the model refuses.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Interviewer backed by the OpenAI chat completions and Whisper APIs.
pub struct OpenAiInterviewer {
    client: Client,
    api_key: SecretString,
    chat_model: String,
    transcription_model: String,
    prompts: PromptSet,
}

impl OpenAiInterviewer {
    pub fn new(
        api_key: SecretString,
        chat_model: String,
        transcription_model: String,
        prompts: PromptSet,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            chat_model,
            transcription_model,
            prompts,
        }
    }

    async fn complete(&self, body: serde_json::Value) -> Result<Choice> {
        let resp = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Failed to reach the chat completions API")?
            .error_for_status()
            .context("Chat completions API returned an error status")?
            .json::<LlmResponse>()
            .await
            .context("Failed to decode chat completions response")?;

        resp.choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))
    }

    async fn chat(&self, body: serde_json::Value) -> Result<String> {
        let choice = self.complete(body).await?;
        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }

    fn question_prompt(&self, role: &str, history: &[Turn], config: &InterviewConfig) -> (String, String) {
        let difficulty = config.difficulty_or_default();
        let job_description = config.job_description_or_default();
        match history.last() {
            None => (
                render(
                    &self.prompts.question_start,
                    &[
                        ("role", role),
                        ("difficulty", difficulty),
                        ("job_description", job_description),
                    ],
                ),
                "Start the interview now.".to_string(),
            ),
            Some(last) => {
                let transcript = format_transcript(history);
                let max_questions = SUGGESTED_QUESTION_COUNT.to_string();
                (
                    render(
                        &self.prompts.question_follow_up,
                        &[
                            ("role", role),
                            ("difficulty", difficulty),
                            ("job_description", job_description),
                            ("history", &transcript),
                            ("last_answer", &last.answer),
                            ("max_questions", &max_questions),
                        ],
                    ),
                    "Generate the next question.".to_string(),
                )
            }
        }
    }
}

#[async_trait]
impl QuestionOracle for OpenAiInterviewer {
    async fn next_question(
        &self,
        role: &str,
        history: &[Turn],
        config: &InterviewConfig,
    ) -> Result<String, OracleError> {
        let (system, user) = self.question_prompt(role, history, config);
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "temperature": 0.8
        });

        self.chat(body)
            .await
            .map_err(|e| OracleError::Unavailable(format!("{e:#}")))
    }
}

#[async_trait]
impl EvaluationOracle for OpenAiInterviewer {
    async fn evaluate(
        &self,
        role: &str,
        transcript: &str,
        config: &InterviewConfig,
    ) -> Result<String, OracleError> {
        let prompt = render(
            &self.prompts.evaluation,
            &[
                ("role", role),
                ("difficulty", config.difficulty_or_default()),
                ("job_description", config.job_description_or_default()),
                ("transcript", transcript),
            ],
        );
        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.2
        });

        let choice = self
            .complete(body)
            .await
            .map_err(|e| OracleError::Unavailable(format!("{e:#}")))?;
        evaluation_text(choice)
    }
}

/// A truncated or empty completion cannot hold a whole report.
fn evaluation_text(choice: Choice) -> Result<String, OracleError> {
    let text = choice.message.content.unwrap_or_default().trim().to_string();
    tracing::debug!("Evaluation reply is {} bytes", text.len());
    if text.is_empty() || choice.finish_reason.as_deref() == Some("length") {
        return Err(OracleError::Malformed(text));
    }
    Ok(text)
}

#[async_trait]
impl Transcriber for OpenAiInterviewer {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, OracleError> {
        let upload = async {
            let file = Part::bytes(clip.bytes.clone())
                .file_name(format!("answer.{}", clip.extension()))
                .mime_str(&clip.mime_type)
                .context("Invalid audio MIME type")?;
            let form = Form::new()
                .text("model", self.transcription_model.clone())
                .part("file", file);

            let resp = self
                .client
                .post(TRANSCRIPTIONS_URL)
                .bearer_auth(self.api_key.expose_secret())
                .multipart(form)
                .send()
                .await
                .context("Failed to reach the transcription API")?
                .error_for_status()
                .context("Transcription API returned an error status")?
                .json::<TranscriptionResponse>()
                .await
                .context("Failed to decode transcription response")?;
            anyhow::Ok(resp.text)
        };

        upload
            .await
            .map_err(|e| OracleError::Unavailable(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::parse_report;
    use std::env;

    fn live_interviewer() -> OpenAiInterviewer {
        dotenvy::dotenv_override().ok();
        let api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
        OpenAiInterviewer::new(
            SecretString::from(api_key),
            "gpt-4o".to_string(),
            "whisper-1".to_string(),
            PromptSet::builtin(),
        )
    }

    fn offline_interviewer() -> OpenAiInterviewer {
        OpenAiInterviewer::new(
            SecretString::from("unused".to_string()),
            "gpt-4o".to_string(),
            "whisper-1".to_string(),
            PromptSet::builtin(),
        )
    }

    #[test]
    fn test_opening_prompt_uses_role_and_defaults() {
        let (system, user) =
            offline_interviewer().question_prompt("Data Analyst", &[], &InterviewConfig::default());
        assert!(system.contains("Data Analyst"));
        assert!(system.contains("medium"));
        assert!(!system.contains("{role}"));
        assert_eq!(user, "Start the interview now.");
    }

    #[test]
    fn test_follow_up_prompt_includes_history_and_last_answer() {
        let history = vec![Turn::new("How would you dedupe events?", "Use an idempotency key.")];
        let config = InterviewConfig {
            difficulty: Some("hard".to_string()),
            job_description: None,
        };
        let (system, _) = offline_interviewer().question_prompt("Backend Engineer", &history, &config);
        assert!(system.contains("1. Q: How would you dedupe events?"));
        assert!(system.contains("Use an idempotency key."));
        assert!(system.contains("hard"));
        assert!(!system.contains("{history}"));
    }

    fn choice(content: Option<&str>, finish_reason: &str) -> Choice {
        Choice {
            message: Message {
                content: content.map(str::to_string),
            },
            finish_reason: Some(finish_reason.to_string()),
        }
    }

    #[test]
    fn test_complete_evaluation_reply_is_passed_through() {
        let text = evaluation_text(choice(Some("  {\"verdict\": \"Pass\"} "), "stop")).unwrap();
        assert_eq!(text, r#"{"verdict": "Pass"}"#);
    }

    #[test]
    fn test_truncated_or_empty_evaluation_is_malformed() {
        let truncated = evaluation_text(choice(Some(r#"{"technical_score": 7"#), "length"));
        assert_eq!(
            truncated,
            Err(OracleError::Malformed(r#"{"technical_score": 7"#.to_string()))
        );

        for content in [None, Some("   ")] {
            assert_eq!(
                evaluation_text(choice(content, "stop")),
                Err(OracleError::Malformed(String::new()))
            );
        }
    }

    #[test]
    fn test_refusal_with_null_content_decodes() {
        let resp: LlmResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": null, "refusal": "no"}, "finish_reason": "stop"}]}"#,
        )
        .unwrap();
        assert!(resp.choices[0].message.content.is_none());
    }

    // Live calls against the OpenAI API. Run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_live_opening_question() {
        let interviewer = live_interviewer();
        let question = interviewer
            .next_question("Data Analyst", &[], &InterviewConfig::default())
            .await
            .expect("question generation failed");
        println!("Question: {}", question);
        assert!(!question.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_evaluation_matches_schema() {
        let interviewer = live_interviewer();
        let transcript = "1. Q: How would you find duplicate rows in a table?\n   A: GROUP BY the key columns with HAVING COUNT(*) > 1.\n2. Q: How would you remove them?\n   A: Use ROW_NUMBER over the key and delete rows above 1.";
        let raw = interviewer
            .evaluate("Data Analyst", transcript, &InterviewConfig::default())
            .await
            .expect("evaluation failed");
        println!("Evaluation JSON: {}", raw);
        parse_report(&raw).expect("reply should satisfy the report schema");
    }
}
