//! Persistence collaborator for vocabulary records.
//!
//! [`RecordStore`] is an opaque record-store oracle: one write per accepted
//! registration, returning the stored record's id. Failures are recoverable
//! by contract — the dialogue layer reports them as a warning and the
//! conversation continues.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::config::NotionConfig;
use crate::error::TutorError;
use crate::extract::VocabularyRecord;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn store(&self, record: &VocabularyRecord) -> Result<String, TutorError>;
}

/// Instantiate the configured store. Without Notion credentials the tutor
/// still runs; registrations are logged instead of persisted remotely.
pub fn create_store(config: &NotionConfig) -> Result<Box<dyn RecordStore>> {
    if config.enabled {
        Ok(Box::new(NotionStore::new(config)?))
    } else {
        Ok(Box::new(LogStore))
    }
}

/// Render the record as the single line written to the store's title field.
pub fn format_record_line(record: &VocabularyRecord) -> String {
    format!(
        "{}: {} ({}) | {} | {}",
        record.term,
        record.translation,
        record.language,
        record.example,
        record.date.format("%Y-%m-%d")
    )
}

// ============ Notion store ============

/// Writes each record as a page in a Notion database.
/// Requires `NOTION_TOKEN` in the environment.
pub struct NotionStore {
    database_id: String,
    timeout: Duration,
}

impl NotionStore {
    pub fn new(config: &NotionConfig) -> Result<Self> {
        let database_id = config
            .database_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("notion.database_id required"))?;
        if std::env::var("NOTION_TOKEN").is_err() {
            anyhow::bail!("NOTION_TOKEN environment variable not set");
        }
        Ok(Self {
            database_id,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl RecordStore for NotionStore {
    async fn store(&self, record: &VocabularyRecord) -> Result<String, TutorError> {
        let token = std::env::var("NOTION_TOKEN")
            .map_err(|_| TutorError::Persistence("NOTION_TOKEN not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TutorError::Persistence(e.to_string()))?;

        // Notion caps title text at 2000 characters.
        let mut line = format_record_line(record);
        if line.chars().count() > 2000 {
            line = line.chars().take(2000).collect();
        }

        let body = serde_json::json!({
            "parent": { "database_id": self.database_id },
            "properties": {
                "Name": {
                    "title": [{ "text": { "content": line } }]
                }
            }
        });

        let response = client
            .post("https://api.notion.com/v1/pages")
            .header("Authorization", format!("Bearer {}", token))
            .header("Notion-Version", "2022-06-28")
            .json(&body)
            .send()
            .await
            .map_err(|e| TutorError::Persistence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(TutorError::Persistence(format!(
                "Notion API {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TutorError::Persistence(e.to_string()))?;

        json.get("id")
            .and_then(|id| id.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| TutorError::Persistence("Notion response missing page id".to_string()))
    }
}

// ============ Log-only store ============

/// Fallback store used when Notion is not configured.
pub struct LogStore;

#[async_trait]
impl RecordStore for LogStore {
    async fn store(&self, record: &VocabularyRecord) -> Result<String, TutorError> {
        let id = Uuid::new_v4().to_string();
        info!(id = %id, line = %format_record_line(record), "record stored locally (Notion disabled)");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record() -> VocabularyRecord {
        VocabularyRecord {
            term: "moon".to_string(),
            translation: "luna".to_string(),
            example: "The moon is bright tonight.".to_string(),
            language: "inglés".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 10, 18).unwrap(),
        }
    }

    #[test]
    fn formats_the_stored_line() {
        assert_eq!(
            format_record_line(&record()),
            "moon: luna (inglés) | The moon is bright tonight. | 2025-10-18"
        );
    }

    #[tokio::test]
    async fn log_store_always_succeeds() {
        let id = LogStore.store(&record()).await.unwrap();
        assert!(!id.is_empty());
    }

    #[test]
    fn notion_store_requires_database_id() {
        let cfg = NotionConfig {
            enabled: true,
            database_id: None,
            timeout_secs: 5,
        };
        assert!(NotionStore::new(&cfg).is_err());
    }
}
