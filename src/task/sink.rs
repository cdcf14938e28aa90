//! Task record persistence and observer delivery.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::Task;
use crate::error::{EngineError, Result};

/// Receives every task mutation.
///
/// The engine calls both methods after each state change; failures are
/// logged and never affect the task itself.
#[async_trait]
pub trait TaskSink: Send + Sync {
    /// Store the task's current record durably.
    async fn persist(&self, task: &Task) -> Result<()>;

    /// Push the update to live observers.
    async fn broadcast(&self, task: &Task) -> Result<()>;
}

/// Writes each task as a JSON file under a state directory, one file per
/// task, rewritten on every update.
pub struct JsonTaskSink {
    dir: PathBuf,
}

impl JsonTaskSink {
    pub fn new(dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl TaskSink for JsonTaskSink {
    async fn persist(&self, task: &Task) -> Result<()> {
        let path = self.dir.join(format!("{}.json", task.id));
        let record = task.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = std::fs::File::create(&path)?;
            let writer = std::io::BufWriter::new(file);
            serde_json::to_writer_pretty(writer, &record)
                .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
    }

    async fn broadcast(&self, task: &Task) -> Result<()> {
        // No live observer channel in the CLI build; the state file is
        // the observable surface.
        debug!(
            "task {} -> {:?} {}% {}",
            task.id, task.status, task.progress, task.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskSource, TaskStatus};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_json_sink_writes_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonTaskSink::new(dir.path().to_path_buf()).unwrap();

        let id = Uuid::new_v4();
        let mut task = Task::new(
            id,
            TaskSource::LocalPath("a.wav".to_string()),
            "Starting...",
        );
        task.status = TaskStatus::Completed;
        task.progress = 100;
        task.transcript = Some("# Video Transcript".to_string());

        sink.persist(&task).await.unwrap();
        sink.broadcast(&task).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(format!("{}.json", id))).unwrap();
        let back: Task = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.id, id);
        assert_eq!(back.status, TaskStatus::Completed);
        assert_eq!(back.transcript.as_deref(), Some("# Video Transcript"));
    }

    #[tokio::test]
    async fn test_json_sink_overwrites_on_update() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonTaskSink::new(dir.path().to_path_buf()).unwrap();

        let id = Uuid::new_v4();
        let mut task = Task::new(
            id,
            TaskSource::LocalPath("a.wav".to_string()),
            "Starting...",
        );
        sink.persist(&task).await.unwrap();

        task.progress = 40;
        task.message = "Transcribing audio...".to_string();
        sink.persist(&task).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(format!("{}.json", id))).unwrap();
        let back: Task = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.progress, 40);
    }
}
