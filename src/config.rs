use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::asr::whisper::WhisperModel;
use crate::error::{EngineError, Result};

/// Which speech-recognition back end the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Local whisper.cpp inference.
    Whisper,
    /// Local FunASR runtime reached over HTTP.
    Funasr,
    /// External qwen3-asr command-line tool.
    Qwen3,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Whisper => write!(f, "whisper"),
            ProviderKind::Funasr => write!(f, "funasr"),
            ProviderKind::Qwen3 => write!(f, "qwen3"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "whisper" => Ok(ProviderKind::Whisper),
            "funasr" => Ok(ProviderKind::Funasr),
            "qwen3" => Ok(ProviderKind::Qwen3),
            _ => Err(EngineError::ProviderUnsupported(s.to_string())),
        }
    }
}

/// Decode controls for the whisper back end.
#[derive(Debug, Clone)]
pub struct WhisperDecodeParams {
    /// Beam width; 1 falls back to greedy sampling.
    pub beam_size: i32,
    /// Candidates per step under greedy sampling.
    pub best_of: i32,
    pub temperature: f32,
    /// Temperature step applied when decoding fails.
    pub temperature_inc: f32,
    /// Skip silent stretches before decoding.
    pub vad_filter: bool,
    /// A pause must last this long to count as a split point.
    pub min_silence_duration_ms: u32,
    /// Audio kept on each side of a detected speech span.
    pub speech_pad_ms: u32,
    pub no_speech_threshold: f32,
    /// Entropy cutoff against repetitive output.
    pub entropy_threshold: f32,
    pub logprob_threshold: f32,
    /// Feed previously decoded text back into the decoder.
    pub condition_on_previous_text: bool,
    pub translate: bool,
}

impl Default for WhisperDecodeParams {
    fn default() -> Self {
        Self {
            beam_size: 5,
            best_of: 5,
            temperature: 0.0,
            temperature_inc: 0.2,
            vad_filter: true,
            min_silence_duration_ms: 500,
            speech_pad_ms: 400,
            no_speech_threshold: 0.6,
            entropy_threshold: 2.4,
            logprob_threshold: -1.0,
            condition_on_previous_text: false,
            translate: false,
        }
    }
}

/// Settings for the FunASR runtime back end.
#[derive(Debug, Clone)]
pub struct FunasrConfig {
    pub endpoint: String,
}

impl Default for FunasrConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:10095/recognize".to_string(),
        }
    }
}

/// Settings for the qwen3-asr CLI back end.
#[derive(Debug, Clone)]
pub struct QwenConfig {
    pub command: String,
    pub model: String,
}

impl Default for QwenConfig {
    fn default() -> Self {
        Self {
            command: "qwen3-asr".to_string(),
            model: "qwen3-asr-flash".to_string(),
        }
    }
}

/// Engine configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderKind,
    /// Language hint passed to recognition (None = auto-detect).
    pub language_hint: Option<String>,
    /// Subtitle languages in preference order.
    pub preferred_subtitle_langs: Vec<String>,
    pub temp_dir: PathBuf,
    pub state_dir: PathBuf,
    pub whisper_model: WhisperModel,
    pub whisper_decode: WhisperDecodeParams,
    pub funasr: FunasrConfig,
    pub qwen: QwenConfig,
}

impl AppConfig {
    /// Read configuration from the environment.
    ///
    /// An unrecognized ASR_PROVIDER is a hard error; everything else falls
    /// back to a default with a warning.
    pub fn from_env() -> Result<Self> {
        let provider = match std::env::var("ASR_PROVIDER") {
            Ok(raw) => raw.parse()?,
            Err(_) => ProviderKind::Whisper,
        };

        let language_hint = std::env::var("ASR_LANGUAGE")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let preferred_subtitle_langs = match std::env::var("PREFERRED_SUBTITLE_LANGS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => default_preferred_langs(),
        };

        let decode_defaults = WhisperDecodeParams::default();
        let whisper_decode = WhisperDecodeParams {
            beam_size: env_parse("WHISPER_BEAM_SIZE", decode_defaults.beam_size),
            temperature: env_parse("WHISPER_TEMPERATURE", decode_defaults.temperature),
            vad_filter: env_parse("WHISPER_VAD_FILTER", decode_defaults.vad_filter),
            ..decode_defaults
        };

        let funasr = FunasrConfig {
            endpoint: std::env::var("FUNASR_ENDPOINT")
                .unwrap_or_else(|_| FunasrConfig::default().endpoint),
        };

        let qwen_defaults = QwenConfig::default();
        let qwen = QwenConfig {
            command: std::env::var("QWEN_ASR_COMMAND").unwrap_or(qwen_defaults.command),
            model: std::env::var("QWEN_ASR_MODEL").unwrap_or(qwen_defaults.model),
        };

        Ok(Self {
            provider,
            language_hint,
            preferred_subtitle_langs,
            temp_dir: PathBuf::from(
                std::env::var("TEMP_DIR").unwrap_or_else(|_| "temp".to_string()),
            ),
            state_dir: PathBuf::from(
                std::env::var("STATE_DIR").unwrap_or_else(|_| "state".to_string()),
            ),
            whisper_model: env_parse("WHISPER_MODEL", WhisperModel::Small),
            whisper_decode,
            funasr,
            qwen,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Whisper,
            language_hint: None,
            preferred_subtitle_langs: default_preferred_langs(),
            temp_dir: PathBuf::from("temp"),
            state_dir: PathBuf::from("state"),
            whisper_model: WhisperModel::Small,
            whisper_decode: WhisperDecodeParams::default(),
            funasr: FunasrConfig::default(),
            qwen: QwenConfig::default(),
        }
    }
}

/// Subtitle languages tried when the caller does not override them.
pub fn default_preferred_langs() -> Vec<String> {
    ["zh-Hans", "zh-Hant", "zh", "en", "ja", "ko"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Parse an env var, keeping the default (with a warning) on bad input.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid value for {}: {:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("whisper".parse::<ProviderKind>().unwrap(), ProviderKind::Whisper);
        assert_eq!("FunASR".parse::<ProviderKind>().unwrap(), ProviderKind::Funasr);
        assert_eq!("qwen3".parse::<ProviderKind>().unwrap(), ProviderKind::Qwen3);
        assert!(matches!(
            "deepgram".parse::<ProviderKind>(),
            Err(EngineError::ProviderUnsupported(_))
        ));
    }

    #[test]
    fn test_default_preferences() {
        let langs = default_preferred_langs();
        assert_eq!(langs[0], "zh-Hans");
        assert_eq!(langs.len(), 6);
    }

    #[test]
    fn test_decode_defaults() {
        let p = WhisperDecodeParams::default();
        assert_eq!(p.beam_size, 5);
        assert!(p.vad_filter);
        assert_eq!(p.min_silence_duration_ms, 500);
        assert!(!p.condition_on_previous_text);
    }
}
