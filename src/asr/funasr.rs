//! FunASR runtime back end.
//!
//! Talks to a locally running FunASR service over HTTP. The service
//! shares this machine's filesystem, so requests reference the audio by
//! path instead of uploading it.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use super::{RawTranscription, SpeechBackend, json_number};
use crate::config::FunasrConfig;
use crate::error::{EngineError, Result};
use crate::transcript::Segment;

pub struct FunasrBackend {
    config: FunasrConfig,
    client: reqwest::Client,
}

impl FunasrBackend {
    pub fn new(config: FunasrConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SpeechBackend for FunasrBackend {
    fn name(&self) -> &'static str {
        "funasr"
    }

    async fn transcribe(
        &self,
        path: &Path,
        language_hint: Option<&str>,
    ) -> Result<RawTranscription> {
        let payload = serde_json::json!({
            "input": [path.to_string_lossy()],
            "language": language_hint.unwrap_or("auto"),
            "batch_size": 1,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| EngineError::Recognition(format!("funasr request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Recognition(format!(
                "funasr returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Recognition(format!("funasr response unreadable: {}", e)))?;
        let value: Value = serde_json::from_str(&body).map_err(|e| {
            EngineError::Recognition(format!("funasr returned invalid JSON: {}", e))
        })?;

        Ok(parse_reply(&value))
    }
}

/// Pull segments out of a FunASR reply.
///
/// The reply shape varies between runtime versions: a bare object or a
/// one-element batch list, sentence timing under `sentence_info` or
/// `sentences`, field names `start`/`end` or `start_time`/`end_time`.
/// Anything unrecognizable degrades to a whole-text segment.
fn parse_reply(value: &Value) -> RawTranscription {
    let item = value.as_array().and_then(|arr| arr.first()).unwrap_or(value);

    let language = item
        .get("language")
        .or_else(|| item.get("lang"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let sentences = item
        .get("sentence_info")
        .or_else(|| item.get("sentences"))
        .and_then(Value::as_array);

    let mut segments = Vec::new();
    if let Some(sentences) = sentences {
        for sentence in sentences {
            let text = sentence
                .get("text")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or("");
            if text.is_empty() {
                continue;
            }
            segments.push(Segment {
                start: field_ms(sentence, "start", "start_time"),
                end: field_ms(sentence, "end", "end_time"),
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

/// Sentence timing in milliseconds, under either field name.
fn field_ms(sentence: &Value, primary: &str, fallback: &str) -> f64 {
    let raw = sentence.get(primary).or_else(|| sentence.get(fallback));
    json_number(raw) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sentence_info() {
        let reply = serde_json::json!([{
            "text": "你好 世界",
            "language": "zh",
            "sentence_info": [
                {"text": "你好", "start": 0, "end": 1500},
                {"text": "世界", "start": 1500, "end": 3000},
            ],
        }]);

        let result = parse_reply(&reply);
        assert_eq!(result.language.as_deref(), Some("zh"));
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[0].text, "你好");
        assert_eq!(result.segments[0].start, 0.0);
        assert_eq!(result.segments[0].end, 1.5);
        assert_eq!(result.segments[1].start, 1.5);
    }

    #[test]
    fn test_parse_alternate_field_names() {
        let reply = serde_json::json!({
            "lang": "en",
            "sentences": [
                {"text": "hello", "start_time": "2500", "end_time": "4000"},
            ],
        });

        let result = parse_reply(&reply);
        assert_eq!(result.language.as_deref(), Some("en"));
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].start, 2.5);
        assert_eq!(result.segments[0].end, 4.0);
    }

    #[test]
    fn test_flat_text_fallback() {
        let reply = serde_json::json!({"text": "  all in one line  "});

        let result = parse_reply(&reply);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].text, "all in one line");
        assert_eq!(result.segments[0].start, 0.0);
        assert_eq!(result.segments[0].end, 0.0);
    }

    #[test]
    fn test_unrecognizable_reply_degrades_to_empty_segment() {
        let reply = serde_json::json!({"status": "ok"});

        let result = parse_reply(&reply);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].text, "");
        assert!(result.language.is_none());
    }

    #[test]
    fn test_empty_sentences_fall_back_to_text() {
        let reply = serde_json::json!({
            "text": "fallback text",
            "sentence_info": [{"text": "   ", "start": 0, "end": 100}],
        });

        let result = parse_reply(&reply);
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].text, "fallback text");
    }
}
