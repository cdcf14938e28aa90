//! Acquisition collaborators.
//!
//! The engine gets media through two seams: a [`SubtitleProvider`] that
//! probes a source for its subtitle catalog, and an [`AudioSource`] that
//! delivers a local WAV for recognition. Remote platforms plug in behind
//! these traits; [`LocalMedia`] covers files already on this machine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::TaskSource;
use crate::error::{EngineError, Result};
use crate::subtitle::{SubtitleCatalog, SubtitleTrack};

/// Yields the subtitle track catalog for a source.
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Probe `source` and return its track catalog. An empty catalog
    /// means no subtitles exist; failures are treated as absence by the
    /// engine, never as task failures.
    async fn extract_subtitles(&self, source: &str, workdir: &Path) -> Result<SubtitleCatalog>;

    /// Fetch cue text for a track whose payload is not inline.
    async fn fetch_track(&self, track: &SubtitleTrack, workdir: &Path) -> Result<String>;
}

/// Result of audio acquisition.
#[derive(Debug, Clone)]
pub struct AcquiredAudio {
    pub path: PathBuf,
    /// Resolved media title (file stem for local sources)
    pub title: Option<String>,
    /// Whether the engine owns deleting the file afterwards
    pub temporary: bool,
}

/// Delivers a local 16 kHz WAV for a task's media.
///
/// Implementations own container handling plus any duration verification
/// or re-encoding; both are best-effort and must not fail an otherwise
/// sound acquisition. The returned path must exist.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn acquire_audio(&self, source: &TaskSource, workdir: &Path) -> Result<AcquiredAudio>;
}

/// Collaborator for media already on this machine. Remote sources need a
/// platform downloader wired in instead.
pub struct LocalMedia;

#[async_trait]
impl SubtitleProvider for LocalMedia {
    async fn extract_subtitles(&self, _source: &str, _workdir: &Path) -> Result<SubtitleCatalog> {
        Ok(SubtitleCatalog::default())
    }

    async fn fetch_track(&self, _track: &SubtitleTrack, _workdir: &Path) -> Result<String> {
        Err(EngineError::Acquisition(
            "local media has no fetchable subtitle tracks".to_string(),
        ))
    }
}

#[async_trait]
impl AudioSource for LocalMedia {
    async fn acquire_audio(&self, source: &TaskSource, _workdir: &Path) -> Result<AcquiredAudio> {
        let TaskSource::LocalPath(path) = source else {
            return Err(EngineError::Acquisition(
                "remote sources need a downloader collaborator".to_string(),
            ));
        };

        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(EngineError::NotFound(path));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if ext != "wav" {
            return Err(EngineError::Acquisition(format!(
                "cannot extract audio from .{} here; provide a 16 kHz mono WAV",
                ext
            )));
        }

        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);

        // The source file is the user's; it is never deleted.
        Ok(AcquiredAudio {
            path,
            title,
            temporary: false,
        })
    }
}

/// Unique file stem for temporary audio, e.g. `audio_1f3a9c2b`.
pub fn temp_audio_stem() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("audio_{}", &id[..8])
}

/// Removes a task's temporary audio on every exit path, including
/// cancellation and panics. Files the collaborator marked non-temporary
/// are left alone.
pub struct TempAudio {
    path: PathBuf,
    owned: bool,
}

impl TempAudio {
    pub fn new(path: PathBuf, owned: bool) -> Self {
        Self { path, owned }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary audio {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_wav_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("meeting notes.wav");
        std::fs::write(&wav, b"RIFF").unwrap();

        let source = TaskSource::LocalPath(wav.to_string_lossy().into_owned());
        let acquired = LocalMedia
            .acquire_audio(&source, dir.path())
            .await
            .unwrap();

        assert_eq!(acquired.path, wav);
        assert_eq!(acquired.title.as_deref(), Some("meeting notes"));
        assert!(!acquired.temporary);
    }

    #[tokio::test]
    async fn test_missing_local_file_is_not_found() {
        let source = TaskSource::LocalPath("/nonexistent/a.wav".to_string());
        let err = LocalMedia
            .acquire_audio(&source, Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_non_wav_local_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mp4 = dir.path().join("video.mp4");
        std::fs::write(&mp4, b"x").unwrap();

        let source = TaskSource::LocalPath(mp4.to_string_lossy().into_owned());
        let err = LocalMedia
            .acquire_audio(&source, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Acquisition(_)));
    }

    #[test]
    fn test_temp_audio_removes_owned_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{}.wav", temp_audio_stem()));
        std::fs::write(&path, b"x").unwrap();

        drop(TempAudio::new(path.clone(), true));
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_audio_leaves_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.wav");
        std::fs::write(&path, b"x").unwrap();

        drop(TempAudio::new(path.clone(), false));
        assert!(path.exists());
    }

    #[test]
    fn test_temp_audio_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("already-gone.wav");
        drop(TempAudio::new(path, true));
    }
}
