//! Background transcription tasks.

pub mod engine;
pub mod media;
pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use engine::{Engine, TaskRequest};
pub use media::{AcquiredAudio, AudioSource, LocalMedia, SubtitleProvider, TempAudio};
pub use sink::{JsonTaskSink, TaskSink};

use crate::error::{EngineError, Result};

/// Error text recorded on user-cancelled tasks.
pub const CANCELLED_BY_USER: &str = "Task cancelled by user";

/// Where a task's media comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TaskSource {
    RemoteUrl(String),
    LocalPath(String),
}

impl TaskSource {
    pub fn describe(&self) -> &str {
        match self {
            TaskSource::RemoteUrl(url) => url,
            TaskSource::LocalPath(path) => path,
        }
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Processing)
    }
}

/// One transcription task's externally visible record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    /// 0-100; never moves backwards while processing
    pub progress: u8,
    /// User-facing status line
    pub message: String,
    pub source: TaskSource,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: Uuid, source: TaskSource, message: &str) -> Self {
        Self {
            id,
            status: TaskStatus::Processing,
            progress: 0,
            message: message.to_string(),
            source,
            created_at: Utc::now(),
            title: None,
            transcript: None,
            error: None,
        }
    }
}

/// Validate the inputs handed to the downstream Q&A collaborator.
pub fn validate_qa_request(question: &str, transcript: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "question must not be empty".to_string(),
        ));
    }
    if transcript.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "transcript must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_task_record_serialization() {
        let task = Task::new(
            Uuid::nil(),
            TaskSource::RemoteUrl("https://example.com/v".to_string()),
            "Starting...",
        );
        let json = serde_json::to_string(&task).unwrap();

        assert!(json.contains("\"status\":\"processing\""));
        assert!(json.contains("\"progress\":0"));
        assert!(json.contains("created_at"));
        // Unset optionals stay out of the record.
        assert!(!json.contains("transcript"));
        assert!(!json.contains("error"));

        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, TaskStatus::Processing);
        assert_eq!(back.source.describe(), "https://example.com/v");
    }

    #[test]
    fn test_qa_request_validation() {
        assert!(validate_qa_request("what is said?", "some transcript").is_ok());
        assert!(matches!(
            validate_qa_request("  ", "some transcript"),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_qa_request("question", ""),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
