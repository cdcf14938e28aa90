//! Local whisper.cpp back end.
//!
//! The ggml model is fetched from Hugging Face on first use and loaded
//! once; each transcription creates its own decoding state, so the
//! context is shared freely. Inference is CPU-bound and runs on a
//! blocking worker thread.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::audio::{self, SpeechSpan};
use super::{RawTranscription, SpeechBackend};
use crate::config::WhisperDecodeParams;
use crate::error::{EngineError, Result};
use crate::transcript::Segment;

/// Allow at most this many consecutive identical segments; more is
/// decoder repetition, not speech.
const MAX_REPEATS: usize = 2;

const GGML_REPO: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Available whisper model sizes (ggml builds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperModel {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl WhisperModel {
    /// File name of the ggml build for this size
    pub fn filename(&self) -> &'static str {
        match self {
            Self::Tiny => "ggml-tiny.bin",
            Self::Base => "ggml-base.bin",
            Self::Small => "ggml-small.bin",
            Self::Medium => "ggml-medium.bin",
            Self::Large => "ggml-large-v3.bin",
        }
    }

    /// Download URL on Hugging Face
    pub fn hf_url(&self) -> String {
        format!("{}/{}", GGML_REPO, self.filename())
    }

    /// Approximate model size in MB
    pub fn size_mb(&self) -> u64 {
        match self {
            Self::Tiny => 75,
            Self::Base => 142,
            Self::Small => 466,
            Self::Medium => 1500,
            Self::Large => 3100,
        }
    }
}

impl fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        })
    }
}

impl std::str::FromStr for WhisperModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tiny" => Ok(Self::Tiny),
            "base" => Ok(Self::Base),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            _ => Err(format!(
                "unknown whisper model '{}', expected one of: tiny, base, small, medium, large",
                s
            )),
        }
    }
}

/// Where model files live
pub fn models_dir() -> PathBuf {
    Path::new("models").join("whisper")
}

/// Path of a specific model file
pub fn model_path(model: WhisperModel) -> PathBuf {
    models_dir().join(model.filename())
}

/// Whether a model is already present and plausibly complete. A file
/// under half the expected size counts as a truncated download.
pub fn is_model_downloaded(model: WhisperModel) -> bool {
    let minimum = model.size_mb() * 1024 * 1024 / 2;
    fs::metadata(model_path(model))
        .map(|meta| meta.len() >= minimum)
        .unwrap_or(false)
}

/// Download a model from Hugging Face, skipping if already present.
pub fn download_model(model: WhisperModel) -> Result<PathBuf> {
    let target = model_path(model);

    if is_model_downloaded(model) {
        info!("Whisper {} model already present at {}", model, target.display());
        return Ok(target);
    }

    fs::create_dir_all(models_dir())?;
    info!("Fetching whisper {} model (~{} MB)...", model, model.size_mb());

    let url = model.hf_url();
    let mut response = reqwest::blocking::Client::new()
        .get(&url)
        .send()
        .map_err(|e| EngineError::Recognition(format!("model download failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(EngineError::Recognition(format!(
            "model download failed: HTTP {} from {}",
            response.status(),
            url
        )));
    }

    let bar = indicatif::ProgressBar::new(response.content_length().unwrap_or(0));
    bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("=> "),
    );

    // Stream into a staging file so an interrupted download never
    // passes the presence check.
    let staging = target.with_extension("part");
    let mut sink = bar.wrap_write(File::create(&staging)?);
    response
        .copy_to(&mut sink)
        .map_err(|e| EngineError::Recognition(format!("model download failed: {}", e)))?;
    drop(sink);
    bar.finish_and_clear();

    fs::rename(&staging, &target)?;
    info!("Whisper model saved to {}", target.display());

    Ok(target)
}

/// The whisper.cpp provider.
pub struct WhisperBackend {
    ctx: Arc<WhisperContext>,
    decode: WhisperDecodeParams,
    n_threads: i32,
}

impl WhisperBackend {
    /// Download the model if needed and load it.
    pub fn new(model: WhisperModel, decode: WhisperDecodeParams) -> Result<Self> {
        let path = download_model(model)?;

        info!("Loading whisper {} model...", model);
        let path_str = path
            .to_str()
            .ok_or_else(|| EngineError::Recognition("model path is not UTF-8".to_string()))?;
        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| EngineError::Recognition(format!("failed to load model: {}", e)))?;

        let n_threads = std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(4)
            .max(1);
        info!("Whisper model loaded ({} threads)", n_threads);

        Ok(Self {
            ctx: Arc::new(ctx),
            decode,
            n_threads,
        })
    }
}

#[async_trait]
impl SpeechBackend for WhisperBackend {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn transcribe(
        &self,
        path: &Path,
        language_hint: Option<&str>,
    ) -> Result<RawTranscription> {
        let ctx = Arc::clone(&self.ctx);
        let decode = self.decode.clone();
        let n_threads = self.n_threads;
        let path = path.to_path_buf();
        let hint = language_hint.map(str::to_string);

        tokio::task::spawn_blocking(move || {
            run_inference(&ctx, &decode, n_threads, &path, hint.as_deref())
        })
        .await
        .map_err(|e| EngineError::Recognition(format!("inference task failed: {}", e)))?
    }
}

fn run_inference(
    ctx: &WhisperContext,
    decode: &WhisperDecodeParams,
    n_threads: i32,
    path: &Path,
    hint: Option<&str>,
) -> Result<RawTranscription> {
    let started = std::time::Instant::now();

    let samples = audio::load_wav_mono_16k(path)?;
    let total_secs = samples.len() as f64 / audio::WHISPER_SAMPLE_RATE as f64;

    let spans = if decode.vad_filter {
        audio::split_into_speech_spans(
            &samples,
            decode.min_silence_duration_ms,
            decode.speech_pad_ms,
        )
    } else {
        vec![audio::whole_span(&samples)]
    };
    info!(
        "Transcribing {:.1}s of audio in {} speech span(s)",
        total_secs,
        spans.len()
    );

    let mut segments = Vec::new();
    let mut language = None;
    for span in &spans {
        let (mut span_segments, span_language) = decode_span(ctx, decode, n_threads, hint, span)?;
        segments.append(&mut span_segments);
        if language.is_none() {
            language = span_language;
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    if elapsed > 0.0 {
        info!(
            "Whisper produced {} segment(s) in {:.1}s ({:.1}x realtime)",
            segments.len(),
            elapsed,
            total_secs / elapsed
        );
    }

    Ok(RawTranscription {
        segments,
        language,
        probability: None,
    })
}

fn sampling_strategy(decode: &WhisperDecodeParams) -> SamplingStrategy {
    if decode.beam_size > 1 {
        SamplingStrategy::BeamSearch {
            beam_size: decode.beam_size,
            patience: -1.0,
        }
    } else {
        SamplingStrategy::Greedy {
            best_of: decode.best_of.max(1),
        }
    }
}

/// Decode one speech span and map its timestamps back to the original
/// audio via the span offset.
fn decode_span(
    ctx: &WhisperContext,
    decode: &WhisperDecodeParams,
    n_threads: i32,
    hint: Option<&str>,
    span: &SpeechSpan,
) -> Result<(Vec<Segment>, Option<String>)> {
    let mut params = FullParams::new(sampling_strategy(decode));

    params.set_n_threads(n_threads);
    params.set_token_timestamps(false);
    params.set_no_speech_thold(decode.no_speech_threshold);
    params.set_entropy_thold(decode.entropy_threshold);
    params.set_logprob_thold(decode.logprob_threshold);
    params.set_temperature(decode.temperature);
    params.set_temperature_inc(decode.temperature_inc);
    params.set_no_context(!decode.condition_on_previous_text);
    params.set_suppress_non_speech_tokens(true);
    params.set_language(Some(hint.unwrap_or("auto")));
    params.set_translate(decode.translate);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_print_special(false);

    let mut state = ctx
        .create_state()
        .map_err(|e| EngineError::Recognition(format!("failed to create state: {}", e)))?;
    state
        .full(params, &span.samples)
        .map_err(|e| EngineError::Recognition(format!("inference failed: {}", e)))?;

    let num_segments = state
        .full_n_segments()
        .map_err(|e| EngineError::Recognition(format!("failed to get segments: {}", e)))?;

    let mut segments = Vec::new();
    let mut last_text: Option<String> = None;
    let mut repeat_count = 0;

    for i in 0..num_segments {
        let start_ts = state
            .full_get_segment_t0(i)
            .map_err(|e| EngineError::Recognition(format!("failed to get start time: {}", e)))?;
        let end_ts = state
            .full_get_segment_t1(i)
            .map_err(|e| EngineError::Recognition(format!("failed to get end time: {}", e)))?;
        let text = state
            .full_get_segment_text(i)
            .map_err(|e| EngineError::Recognition(format!("failed to get text: {}", e)))?;

        let text = text.trim().to_string();
        if text.is_empty() {
            continue;
        }

        let is_repeat = last_text.as_deref() == Some(text.as_str());
        if is_repeat {
            repeat_count += 1;
            if repeat_count >= MAX_REPEATS {
                continue;
            }
        } else {
            repeat_count = 0;
        }
        last_text = Some(text.clone());

        // Timestamps are in centiseconds within the span.
        segments.push(Segment {
            start: span.offset_secs + start_ts as f64 / 100.0,
            end: span.offset_secs + end_ts as f64 / 100.0,
            text,
        });
    }

    let language = state
        .full_lang_id_from_state()
        .ok()
        .and_then(|id| whisper_rs::get_lang_str(id).map(|s| s.to_string()));

    Ok((segments, language))
}
