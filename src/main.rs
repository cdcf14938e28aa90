use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use dotenvy::dotenv;
use tracing::{info, warn};

mod asr;
mod config;
mod error;
mod subtitle;
mod task;
mod transcript;

use config::AppConfig;
use subtitle::SubtitleFormat;
use task::{Engine, JsonTaskSink, LocalMedia, TaskRequest, TaskStatus};
use transcript::TranscriptMeta;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .context("usage: scribey <media.wav | subtitles.srt | url> [output.md]")?;
    let output = args.next().map(PathBuf::from);

    let config = AppConfig::from_env()?;
    if let Some(hint) = &config.language_hint {
        if !transcript::supported_languages().contains(&hint.as_str()) {
            warn!("Language hint '{}' has no display name; transcripts will show the raw code", hint);
        }
    }

    // A subtitle file needs no task machinery; parse and render directly.
    if let Some(format) = Path::new(&input)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(SubtitleFormat::from_extension)
    {
        let markdown = render_subtitle_file(Path::new(&input), format)?;
        return write_output(&markdown, output.as_deref());
    }

    let sink = Arc::new(
        JsonTaskSink::new(config.state_dir.clone()).context("failed to create state directory")?,
    );
    let engine = Engine::new(config, Arc::new(LocalMedia), Arc::new(LocalMedia), sink)?;

    let request = if input.starts_with("http://") || input.starts_with("https://") {
        TaskRequest {
            url: Some(input.clone()),
            local_path: None,
        }
    } else {
        TaskRequest {
            url: None,
            local_path: Some(input.clone()),
        }
    };

    let id = engine.create_task(request).await?;
    info!("Task {} started for {}", id, input);

    let mut last_progress = 0u8;
    let task = loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let Some(task) = engine.task(id) else {
            anyhow::bail!("task {} disappeared", id);
        };
        if task.status.is_terminal() {
            break task;
        }
        if task.progress != last_progress {
            info!("[{:>3}%] {}", task.progress, task.message);
            last_progress = task.progress;
        }
    };

    match task.status {
        TaskStatus::Completed => {
            let markdown = task.transcript.unwrap_or_default();
            write_output(&markdown, output.as_deref())
        }
        TaskStatus::Cancelled => anyhow::bail!("task was cancelled"),
        _ => anyhow::bail!(
            "transcription failed: {}",
            task.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

/// Parse a subtitle file straight into a transcript document.
fn render_subtitle_file(path: &Path, format: SubtitleFormat) -> anyhow::Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let segments = subtitle::parse(&raw, format);
    let blocks = transcript::merge_segments(&segments);
    let meta = TranscriptMeta {
        title: path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string),
        ..TranscriptMeta::default()
    };
    Ok(transcript::render_transcript(&blocks, &meta))
}

fn write_output(markdown: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, markdown)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Transcript written to {}", path.display());
        }
        None => println!("{}", markdown),
    }
    Ok(())
}
