//! qwen3-asr CLI back end.
//!
//! Shells out to the qwen3-asr tool, which prints its result as JSON on
//! stdout. The subprocess blocks, so it runs on a worker thread.

use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use serde_json::Value;

use super::{RawTranscription, SpeechBackend, json_number};
use crate::config::QwenConfig;
use crate::error::{EngineError, Result};
use crate::transcript::Segment;

pub struct QwenBackend {
    config: QwenConfig,
}

impl QwenBackend {
    pub fn new(config: QwenConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SpeechBackend for QwenBackend {
    fn name(&self) -> &'static str {
        "qwen3"
    }

    async fn transcribe(
        &self,
        path: &Path,
        language_hint: Option<&str>,
    ) -> Result<RawTranscription> {
        let config = self.config.clone();
        let path = path.to_path_buf();
        let hint = language_hint.map(str::to_string);

        let output = tokio::task::spawn_blocking(move || {
            let mut cmd = Command::new(&config.command);
            cmd.arg("--model")
                .arg(&config.model)
                .arg("--audio")
                .arg(&path)
                .arg("--format")
                .arg("json");
            if let Some(lang) = &hint {
                cmd.arg("--language").arg(lang);
            }
            cmd.output()
        })
        .await
        .map_err(|e| EngineError::Recognition(format!("qwen3 task failed: {}", e)))?
        .map_err(|e| EngineError::Recognition(format!("failed to run qwen3-asr: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Recognition(format!(
                "qwen3-asr exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value: Value = serde_json::from_str(stdout.trim()).map_err(|e| {
            EngineError::Recognition(format!("qwen3-asr printed invalid JSON: {}", e))
        })?;

        Ok(parse_reply(&value))
    }
}

/// Pull segments out of a qwen3-asr result.
///
/// The tool prints either a bare object or a one-element list; segment
/// timings are already in seconds, under `start_time`/`end_time` or
/// `start`/`end`. Anything unrecognizable degrades to a whole-text
/// segment.
fn parse_reply(value: &Value) -> RawTranscription {
    let item = value.as_array().and_then(|arr| arr.first()).unwrap_or(value);

    let language = item
        .get("language")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut segments = Vec::new();
    if let Some(listed) = item.get("segments").and_then(Value::as_array) {
        for entry in listed {
            let text = entry
                .get("text")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or("");
            if text.is_empty() {
                continue;
            }
            segments.push(Segment {
                start: field_secs(entry, "start_time", "start"),
                end: field_secs(entry, "end_time", "end"),
                text: text.to_string(),
            });
        }
    }

    if segments.is_empty() {
        let text = item
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        segments.push(Segment {
            start: 0.0,
            end: 0.0,
            text: text.to_string(),
        });
    }

    RawTranscription {
        segments,
        language,
        probability: None,
    }
}

fn field_secs(entry: &Value, primary: &str, fallback: &str) -> f64 {
    json_number(entry.get(primary).or_else(|| entry.get(fallback)))
}
