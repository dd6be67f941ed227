//! Chat model oracle.
//!
//! [`ChatModel`] is the completion interface the dialogue layer depends on:
//! an ordered message sequence in, free text out. System-role messages carry
//! task instructions (persona, extraction contracts) and are never mixed into
//! user/assistant history by the implementations.
//!
//! The shipped backend talks to any OpenAI-compatible
//! `POST /chat/completions` endpoint with timeout and retry/backoff.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::TutorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of conversation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(rename = "content")]
    pub text: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Opaque text-generation oracle.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TutorError>;
}

/// Chat completions against an OpenAI-compatible endpoint.
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIChat {
    model: String,
    base_url: String,
    temperature: f64,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAIChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            anyhow::bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn request(&self, messages: &[ChatMessage]) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("chat API {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("chat API {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TutorError> {
        self.request(messages)
            .await
            .map_err(|e| TutorError::Oracle(e.to_string()))
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_with_openai_field_names() {
        let msg = ChatMessage::user("qué significa hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "qué significa hello");
    }

    #[test]
    fn parses_completion_content() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  hola  "}}]
        });
        assert_eq!(parse_completion(&json).unwrap(), "hola");
    }

    #[test]
    fn rejects_malformed_completion() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_completion(&json).is_err());
    }
}
