//! Speech recognition behind one interface.
//!
//! Each provider lives in its own module and reports a [`RawTranscription`];
//! the [`SpeechRecognizer`] normalizes that into the one result shape the
//! rest of the engine sees, and serializes inference behind an admission
//! gate so at most one recognition runs at a time.

pub mod audio;
pub mod funasr;
pub mod qwen;
pub mod whisper;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{AppConfig, ProviderKind};
use crate::error::{EngineError, Result};
use crate::transcript::Segment;

/// Language detection reported alongside recognized segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    pub code: String,
    /// Confidence in [0, 1]; 0.0 when the back end reports none
    pub probability: f32,
}

/// The normalized recognition result. Provider-native response shapes
/// never leave their back end module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub segments: Vec<Segment>,
    pub language: DetectedLanguage,
}

/// What a back end reports before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawTranscription {
    pub segments: Vec<Segment>,
    pub language: Option<String>,
    pub probability: Option<f32>,
}

/// One speech-recognition provider.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Transcribe the audio file at `path`. Implementations run blocking
    /// work on worker threads; the returned segments may be empty.
    async fn transcribe(&self, path: &Path, language_hint: Option<&str>)
    -> Result<RawTranscription>;
}

/// Adapter in front of the configured back end.
///
/// Holds the process-wide admission gate: recognition requests queue here
/// and inference never runs twice concurrently.
pub struct SpeechRecognizer {
    backend: Arc<dyn SpeechBackend>,
    gate: Arc<Semaphore>,
    language_hint: Option<String>,
}

impl SpeechRecognizer {
    /// Build the configured back end. Misconfiguration surfaces here,
    /// before any task exists.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend: Arc<dyn SpeechBackend> = match config.provider {
            ProviderKind::Whisper => Arc::new(whisper::WhisperBackend::new(
                config.whisper_model,
                config.whisper_decode.clone(),
            )?),
            ProviderKind::Funasr => Arc::new(funasr::FunasrBackend::new(config.funasr.clone())),
            ProviderKind::Qwen3 => Arc::new(qwen::QwenBackend::new(config.qwen.clone())),
        };
        Ok(Self::with_backend(backend, config.language_hint.clone()))
    }

    /// Wrap an existing back end. Tests inject mock providers here.
    pub fn with_backend(backend: Arc<dyn SpeechBackend>, language_hint: Option<String>) -> Self {
        Self {
            backend,
            gate: Arc::new(Semaphore::new(1)),
            language_hint,
        }
    }

    /// Transcribe one audio file behind the admission gate.
    ///
    /// Waiting for the gate is cancellable. Once inference has started it
    /// runs to completion on its worker thread; callers observe the
    /// cancellation right after it returns.
    pub async fn transcribe(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionResult> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            permit = self.gate.clone().acquire_owned() => permit
                .map_err(|_| EngineError::Recognition("admission gate closed".to_string()))?,
        };

        info!("Recognition started ({})", self.backend.name());
        let outcome = self
            .backend
            .transcribe(path, self.language_hint.as_deref())
            .await;
        drop(permit);

        let mut raw = outcome?;

        // Reported language wins, then the configured hint.
        let code = raw
            .language
            .filter(|l| !l.is_empty())
            .or_else(|| self.language_hint.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let probability = raw.probability.unwrap_or(0.0);

        // Downstream always gets at least one segment, even if the model
        // heard nothing.
        if raw.segments.is_empty() {
            raw.segments.push(Segment {
                start: 0.0,
                end: 0.0,
                text: String::new(),
            });
        }

        for (i, segment) in raw.segments.iter().enumerate() {
            let preview: String = segment.text.chars().take(50).collect();
            debug!(
                "segment {}: [{:.2} - {:.2}] {}",
                i + 1,
                segment.start,
                segment.end,
                preview
            );
        }
        let speech_secs: f64 = raw.segments.iter().map(Segment::duration).sum();
        info!(
            "Recognition finished: {} segment(s), {:.1}s of speech, language {}",
            raw.segments.len(),
            speech_secs,
            code
        );

        Ok(TranscriptionResult {
            segments: raw.segments,
            language: DetectedLanguage { code, probability },
        })
    }
}

/// Accept numbers serialized as JSON numbers or strings; anything else
/// reads as zero. Provider replies are loose about this.
pub(crate) fn json_number(value: Option<&serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowBackend {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl SpeechBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn transcribe(
            &self,
            _path: &Path,
            _language_hint: Option<&str>,
        ) -> Result<RawTranscription> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(RawTranscription::default())
        }
    }

    struct EmptyBackend;

    #[async_trait]
    impl SpeechBackend for EmptyBackend {
        fn name(&self) -> &'static str {
            "empty"
        }

        async fn transcribe(
            &self,
            _path: &Path,
            _language_hint: Option<&str>,
        ) -> Result<RawTranscription> {
            Ok(RawTranscription::default())
        }
    }

    #[tokio::test]
    async fn test_gate_serializes_recognition() {
        let backend = Arc::new(SlowBackend::default());
        let recognizer = Arc::new(SpeechRecognizer::with_backend(backend.clone(), None));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let recognizer = recognizer.clone();
            handles.push(tokio::spawn(async move {
                let token = CancellationToken::new();
                recognizer.transcribe(Path::new("a.wav"), &token).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queued_request_is_cancellable() {
        let backend = Arc::new(SlowBackend::default());
        let recognizer = Arc::new(SpeechRecognizer::with_backend(backend.clone(), None));

        let first = {
            let recognizer = recognizer.clone();
            tokio::spawn(async move {
                let token = CancellationToken::new();
                recognizer.transcribe(Path::new("a.wav"), &token).await
            })
        };
        // Let the first request take the gate.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let err = recognizer
            .transcribe(Path::new("b.wav"), &cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));

        first.await.unwrap().unwrap();
        // The cancelled request never reached the back end.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_normalized() {
        let recognizer =
            SpeechRecognizer::with_backend(Arc::new(EmptyBackend), Some("ja".to_string()));
        let token = CancellationToken::new();

        let result = recognizer
            .transcribe(Path::new("x.wav"), &token)
            .await
            .unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].text, "");
        assert_eq!(result.segments[0].start, 0.0);
        // No reported language, so the hint applies.
        assert_eq!(result.language.code, "ja");
        assert_eq!(result.language.probability, 0.0);
    }

    #[tokio::test]
    async fn test_language_fallback_to_unknown() {
        let recognizer = SpeechRecognizer::with_backend(Arc::new(EmptyBackend), None);
        let token = CancellationToken::new();

        let result = recognizer
            .transcribe(Path::new("x.wav"), &token)
            .await
            .unwrap();
        assert_eq!(result.language.code, "unknown");
    }

    #[test]
    fn test_json_number_accepts_strings() {
        let n = serde_json::json!(1500);
        let s = serde_json::json!("2500");
        let junk = serde_json::json!({"x": 1});
        assert_eq!(json_number(Some(&n)), 1500.0);
        assert_eq!(json_number(Some(&s)), 2500.0);
        assert_eq!(json_number(Some(&junk)), 0.0);
        assert_eq!(json_number(None), 0.0);
    }
}
