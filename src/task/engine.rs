//! The task orchestrator.
//!
//! One engine owns all task records, their cancellation tokens, and the
//! collaborators tasks run against. Remote sources try the subtitle path
//! first and fall back to recognition; local files go straight to
//! recognition. Every state mutation goes through this module and is
//! followed by a persist and a broadcast.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::media::{AudioSource, SubtitleProvider, TempAudio};
use super::sink::TaskSink;
use super::{CANCELLED_BY_USER, Task, TaskSource, TaskStatus};
use crate::asr::SpeechRecognizer;
use crate::config::AppConfig;
use crate::error::{EngineError, Result};
use crate::subtitle::{SubtitleFormat, TrackPayload, choose_best_subtitle, parse};
use crate::transcript::{TranscriptMeta, merge_segments, render_transcript};

/// A subtitle shorter than this after merging carries no real content.
const MIN_USABLE_SUBTITLE_CHARS: usize = 10;

/// Inputs accepted at task creation. Exactly one of the two must be set.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub url: Option<String>,
    pub local_path: Option<String>,
}

struct SubtitleTranscript {
    markdown: String,
    title: Option<String>,
}

/// The transcript acquisition engine.
pub struct Engine {
    config: AppConfig,
    recognizer: SpeechRecognizer,
    subtitles: Arc<dyn SubtitleProvider>,
    audio: Arc<dyn AudioSource>,
    sink: Arc<dyn TaskSink>,
    tasks: DashMap<Uuid, Task>,
    cancellations: DashMap<Uuid, CancellationToken>,
}

impl Engine {
    /// Build an engine. Recognition back-end construction happens here,
    /// so misconfiguration surfaces before any task exists.
    pub fn new(
        config: AppConfig,
        subtitles: Arc<dyn SubtitleProvider>,
        audio: Arc<dyn AudioSource>,
        sink: Arc<dyn TaskSink>,
    ) -> Result<Arc<Self>> {
        let recognizer = SpeechRecognizer::from_config(&config)?;
        Self::with_recognizer(config, recognizer, subtitles, audio, sink)
    }

    /// Same, with a prebuilt recognizer. Tests inject mock back ends
    /// through this.
    pub fn with_recognizer(
        config: AppConfig,
        recognizer: SpeechRecognizer,
        subtitles: Arc<dyn SubtitleProvider>,
        audio: Arc<dyn AudioSource>,
        sink: Arc<dyn TaskSink>,
    ) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.temp_dir)?;
        Ok(Arc::new(Self {
            config,
            recognizer,
            subtitles,
            audio,
            sink,
            tasks: DashMap::new(),
            cancellations: DashMap::new(),
        }))
    }

    /// Validate a request and spawn its task. Returns the task id; the
    /// task itself runs in the background.
    pub async fn create_task(self: &Arc<Self>, request: TaskRequest) -> Result<Uuid> {
        let source = match (request.url, request.local_path) {
            (Some(url), None) => {
                let url = url.trim().to_string();
                if url.is_empty() {
                    return Err(EngineError::InvalidInput("url must not be empty".to_string()));
                }
                TaskSource::RemoteUrl(url)
            }
            (None, Some(path)) => {
                let candidate = PathBuf::from(&path);
                if !candidate.exists() {
                    return Err(EngineError::NotFound(candidate));
                }
                if !candidate.is_file() {
                    return Err(EngineError::InvalidInput(format!("{} is not a file", path)));
                }
                TaskSource::LocalPath(path)
            }
            (Some(_), Some(_)) => {
                return Err(EngineError::InvalidInput(
                    "provide either a url or a local path, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(EngineError::InvalidInput(
                    "provide a url or a local path".to_string(),
                ));
            }
        };

        let message = match &source {
            TaskSource::RemoteUrl(_) => "Starting video transcription...",
            TaskSource::LocalPath(_) => "Starting local file transcription...",
        };

        let id = Uuid::new_v4();
        let task = Task::new(id, source.clone(), message);
        self.tasks.insert(id, task.clone());
        self.publish(&task).await;

        let token = CancellationToken::new();
        self.cancellations.insert(id, token.clone());

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_task(id, source, token).await;
        });

        info!("Created task {} for {}", id, task.source.describe());
        Ok(id)
    }

    /// Request cancellation. Returns false for unknown or already
    /// finished tasks.
    pub fn cancel_task(&self, id: Uuid) -> bool {
        match self.cancellations.get(&id) {
            Some(token) => {
                token.cancel();
                info!("Cancellation requested for task {}", id);
                true
            }
            None => false,
        }
    }

    /// Current record for a task.
    pub fn task(&self, id: Uuid) -> Option<Task> {
        self.tasks.get(&id).map(|t| t.clone())
    }

    /// Validated transcript context for the downstream Q&A collaborator.
    pub fn qa_context(&self, id: Uuid, question: &str) -> Result<String> {
        let Some(task) = self.task(id) else {
            return Err(EngineError::InvalidInput(format!("unknown task {}", id)));
        };
        let transcript = task.transcript.unwrap_or_default();
        super::validate_qa_request(question, &transcript)?;
        Ok(transcript)
    }

    async fn run_task(self: Arc<Self>, id: Uuid, source: TaskSource, token: CancellationToken) {
        let outcome = match &source {
            TaskSource::RemoteUrl(url) => self.run_remote(id, url, &token).await,
            TaskSource::LocalPath(path) => self.run_local(id, path, &token).await,
        };

        match outcome {
            Ok(()) => {}
            Err(EngineError::Cancelled) => self.finish_cancelled(id).await,
            Err(e) => self.finish_error(id, &e).await,
        }

        // Terminal either way; the token has nothing left to interrupt.
        self.cancellations.remove(&id);
    }

    async fn run_remote(&self, id: Uuid, url: &str, token: &CancellationToken) -> Result<()> {
        self.update(id, 5, "Checking for subtitles...").await;

        let subtitle = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(EngineError::Cancelled),
            result = self.subtitle_transcript(url) => result,
        };

        match subtitle {
            Ok(Some(found)) => {
                self.update(id, 80, "Transcript extracted from subtitles").await;
                self.finish_completed(id, found.markdown, found.title).await;
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                // Subtitle probing is best-effort; recognition still runs.
                warn!("Subtitle extraction failed for {}: {}", url, e);
            }
        }

        Self::ensure_active(token)?;
        self.update(id, 10, "No usable subtitles, downloading audio...")
            .await;
        self.transcribe_source(id, &TaskSource::RemoteUrl(url.to_string()), Some(url), token)
            .await
    }

    async fn run_local(&self, id: Uuid, path: &str, token: &CancellationToken) -> Result<()> {
        self.update(id, 5, "Extracting audio...").await;
        self.transcribe_source(id, &TaskSource::LocalPath(path.to_string()), None, token)
            .await
    }

    /// Run the subtitle path: probe the catalog, choose a track, fetch
    /// its cues, parse, merge, and render. `None` when nothing usable
    /// exists.
    async fn subtitle_transcript(&self, url: &str) -> Result<Option<SubtitleTranscript>> {
        let catalog = self
            .subtitles
            .extract_subtitles(url, &self.config.temp_dir)
            .await?;
        let title = catalog.title.clone();

        if catalog.is_empty() {
            info!("No subtitle tracks for {}", url);
            return Ok(None);
        }
        let Some(chosen) = choose_best_subtitle(&catalog, &self.config.preferred_subtitle_langs)
        else {
            info!("No subtitle track matched for {}", url);
            return Ok(None);
        };
        info!(
            "Chose subtitle track '{}' (auto-generated: {})",
            chosen.lang,
            chosen.is_auto()
        );

        let language = chosen.lang.strip_prefix("ai-").unwrap_or(chosen.lang).to_string();
        let (raw, ext) = match &chosen.track.payload {
            TrackPayload::Inline { data, ext } => (data.clone(), ext.clone()),
            TrackPayload::Remote { ext, .. } => {
                let data = self
                    .subtitles
                    .fetch_track(chosen.track, &self.config.temp_dir)
                    .await?;
                (data, ext.clone())
            }
        };

        if raw.trim().chars().count() <= MIN_USABLE_SUBTITLE_CHARS {
            info!("Subtitle track for {} is too short to use", url);
            return Ok(None);
        }

        let format = ext
            .as_deref()
            .and_then(SubtitleFormat::from_extension)
            .unwrap_or_else(|| SubtitleFormat::sniff(&raw));
        let segments = parse(&raw, format);
        let blocks = merge_segments(&segments);

        let merged_chars: usize = blocks.iter().map(|b| b.text.trim().chars().count()).sum();
        if merged_chars < MIN_USABLE_SUBTITLE_CHARS {
            info!("Parsed subtitle for {} carries no usable text", url);
            return Ok(None);
        }

        let meta = TranscriptMeta {
            title: title.clone(),
            language,
            probability: 0.0,
            source_url: Some(url.to_string()),
        };
        Ok(Some(SubtitleTranscript {
            markdown: render_transcript(&blocks, &meta),
            title,
        }))
    }

    /// The recognition path shared by remote fallback and local files.
    async fn transcribe_source(
        &self,
        id: Uuid,
        source: &TaskSource,
        source_url: Option<&str>,
        token: &CancellationToken,
    ) -> Result<()> {
        let acquired = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(EngineError::Cancelled),
            result = self.audio.acquire_audio(source, &self.config.temp_dir) => result?,
        };

        if !acquired.path.exists() {
            return Err(EngineError::Acquisition(format!(
                "acquired audio missing at {}",
                acquired.path.display()
            )));
        }

        // Guard scope covers recognition; the temp file is gone on every
        // exit path from here on.
        let guard = TempAudio::new(acquired.path.clone(), acquired.temporary);

        self.update(id, 40, "Transcribing audio...").await;

        // Queue waiting inside the recognizer is cancellable. A started
        // inference runs to completion and the token is checked after.
        let result = self.recognizer.transcribe(guard.path(), token).await?;
        Self::ensure_active(token)?;

        let blocks = merge_segments(&result.segments);
        let meta = TranscriptMeta {
            title: acquired.title.clone(),
            language: result.language.code.clone(),
            probability: result.language.probability,
            source_url: source_url.map(str::to_string),
        };
        let markdown = render_transcript(&blocks, &meta);

        drop(guard);
        self.finish_completed(id, markdown, acquired.title).await;
        Ok(())
    }

    fn ensure_active(token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    async fn publish(&self, task: &Task) {
        if let Err(e) = self.sink.persist(task).await {
            warn!("Persist failed for task {}: {}", task.id, e);
        }
        if let Err(e) = self.sink.broadcast(task).await {
            warn!("Broadcast failed for task {}: {}", task.id, e);
        }
    }

    /// Apply a progress update. Progress never moves backwards, and
    /// terminal records are never touched.
    async fn update(&self, id: Uuid, progress: u8, message: &str) {
        let updated = self.tasks.get_mut(&id).map(|mut task| {
            if task.status == TaskStatus::Processing {
                task.progress = task.progress.max(progress);
                task.message = message.to_string();
            }
            task.clone()
        });
        if let Some(task) = updated {
            self.publish(&task).await;
        }
    }

    async fn finish_completed(&self, id: Uuid, markdown: String, title: Option<String>) {
        let updated = self.tasks.get_mut(&id).map(|mut task| {
            task.status = TaskStatus::Completed;
            task.progress = 100;
            task.message.clear();
            task.transcript = Some(markdown);
            task.title = title;
            task.clone()
        });
        if let Some(task) = updated {
            info!("Task {} completed", id);
            self.publish(&task).await;
        }
    }

    async fn finish_cancelled(&self, id: Uuid) {
        let updated = self.tasks.get_mut(&id).map(|mut task| {
            task.status = TaskStatus::Cancelled;
            task.message = "Task cancelled".to_string();
            task.error = Some(CANCELLED_BY_USER.to_string());
            task.clone()
        });
        if let Some(task) = updated {
            info!("Task {} cancelled", id);
            self.publish(&task).await;
        }
    }

    async fn finish_error(&self, id: Uuid, error: &EngineError) {
        let updated = self.tasks.get_mut(&id).map(|mut task| {
            task.status = TaskStatus::Error;
            task.error = Some(error.to_string());
            task.message = format!("Transcription failed: {}", error);
            task.clone()
        });
        if let Some(task) = updated {
            warn!("Task {} failed: {}", id, error);
            self.publish(&task).await;
        }
    }
}
