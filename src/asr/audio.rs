//! Audio input for the recognition back ends.
//!
//! Back ends consume 16 kHz mono f32 samples normalized to [-1.0, 1.0].
//! Acquisition delivers WAV; stereo is downmixed and higher rates are
//! reduced. The silence-region splitter implements the whisper back end's
//! voice-activity filter.

use std::path::Path;

use crate::error::{EngineError, Result};

/// Sample rate whisper.cpp expects
pub const WHISPER_SAMPLE_RATE: u32 = 16000;
/// RMS below this counts as silence; 0.01 is roughly -40dB
const SILENCE_THRESHOLD: f32 = 0.01;
/// Window size for silence detection (100ms at 16kHz)
const SILENCE_WINDOW_SIZE: usize = 1600;
/// Speech spans shorter than this are dropped as noise (0.5s)
const MIN_SPAN_SAMPLES: usize = (WHISPER_SAMPLE_RATE / 2) as usize;

/// A run of speech cut out of the input, with its absolute position kept
/// so segment timestamps can be mapped back.
#[derive(Debug, Clone)]
pub struct SpeechSpan {
    /// 16 kHz mono samples
    pub samples: Vec<f32>,
    /// Offset of the span within the original audio, in seconds
    pub offset_secs: f64,
}

/// The whole input as a single span at offset zero.
pub fn whole_span(samples: &[f32]) -> SpeechSpan {
    SpeechSpan {
        samples: samples.to_vec(),
        offset_secs: 0.0,
    }
}

/// Read a WAV file into 16 kHz mono samples normalized to [-1.0, 1.0].
pub fn load_wav_mono_16k(path: &Path) -> Result<Vec<f32>> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| EngineError::Recognition(format!("cannot read {}: {}", path.display(), e)))?;
    let spec = reader.spec();

    let read_error =
        |e: hound::Error| EngineError::Recognition(format!("bad WAV {}: {}", path.display(), e));

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(read_error)?,
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(read_error)?,
        (hound::SampleFormat::Int, bits) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(read_error)?
        }
    };

    let mono = if spec.channels > 1 {
        downmix(&samples, spec.channels as usize)
    } else {
        samples
    };

    Ok(resample_to_16k(&mono, spec.sample_rate))
}

/// Average interleaved channels into mono.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Bring samples down to 16 kHz. Integer multiples (48k, 32k) average
/// whole chunks; anything else interpolates linearly.
fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == WHISPER_SAMPLE_RATE || samples.is_empty() {
        return samples.to_vec();
    }

    if source_rate % WHISPER_SAMPLE_RATE == 0 {
        let ratio = (source_rate / WHISPER_SAMPLE_RATE) as usize;
        return samples
            .chunks(ratio)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect();
    }

    let ratio = source_rate as f64 / WHISPER_SAMPLE_RATE as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx.min(samples.len() - 1)];
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

/// Cut the input into padded speech spans, dropping silence.
///
/// A pause must last `min_silence_ms` to split; each span keeps
/// `pad_ms` of audio on both sides so word onsets survive the cut. An
/// empty result means the audio held no detectable speech.
pub fn split_into_speech_spans(
    samples: &[f32],
    min_silence_ms: u32,
    pad_ms: u32,
) -> Vec<SpeechSpan> {
    if samples.is_empty() {
        return Vec::new();
    }

    let min_silence = ms_to_samples(min_silence_ms);
    let pad = ms_to_samples(pad_ms);
    let pauses = silent_ranges(samples, min_silence);

    if pauses.is_empty() {
        return vec![whole_span(samples)];
    }

    let mut spans = Vec::new();
    let mut cursor = 0usize;
    for &(pause_start, pause_end) in &pauses {
        push_span(&mut spans, samples, cursor, pause_start, pad);
        cursor = pause_end;
    }
    push_span(&mut spans, samples, cursor, samples.len(), pad);

    spans
}

fn push_span(spans: &mut Vec<SpeechSpan>, samples: &[f32], start: usize, end: usize, pad: usize) {
    if end <= start {
        return;
    }

    let padded_start = start.saturating_sub(pad);
    let padded_end = (end + pad).min(samples.len());
    let span = &samples[padded_start..padded_end];

    if span.len() < MIN_SPAN_SAMPLES || is_quiet(span) {
        return;
    }

    spans.push(SpeechSpan {
        samples: span.to_vec(),
        offset_secs: padded_start as f64 / WHISPER_SAMPLE_RATE as f64,
    });
}

/// Sample ranges `(start, end)` of pauses lasting at least `min_len`
/// samples, scanned in fixed windows.
fn silent_ranges(samples: &[f32], min_len: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;

    let mut pos = 0;
    while pos < samples.len() {
        let end = (pos + SILENCE_WINDOW_SIZE).min(samples.len());
        let quiet = is_quiet(&samples[pos..end]);

        match run_start {
            None if quiet => run_start = Some(pos),
            Some(start) if !quiet => {
                if pos - start >= min_len {
                    ranges.push((start, pos));
                }
                run_start = None;
            }
            _ => {}
        }

        pos += SILENCE_WINDOW_SIZE;
    }

    // Audio that ends inside a pause still closes the range.
    if let Some(start) = run_start {
        if samples.len() - start >= min_len {
            ranges.push((start, samples.len()));
        }
    }

    ranges
}

/// RMS energy of one window against the silence threshold.
fn is_quiet(window: &[f32]) -> bool {
    if window.is_empty() {
        return true;
    }

    let energy = window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32;
    energy.sqrt() < SILENCE_THRESHOLD
}

fn ms_to_samples(ms: u32) -> usize {
    ms as usize * WHISPER_SAMPLE_RATE as usize / 1000
}
