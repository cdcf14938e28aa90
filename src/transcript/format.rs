//! Markdown rendering of transcript blocks.

use std::fmt::Write as FmtWrite;

use super::segment::TranscriptBlock;

/// Metadata rendered into the transcript header.
#[derive(Debug, Clone)]
pub struct TranscriptMeta {
    pub title: Option<String>,
    /// Detected or declared language code
    pub language: String,
    /// Detection confidence; carried on the record, not displayed
    pub probability: f32,
    pub source_url: Option<String>,
}

impl Default for TranscriptMeta {
    fn default() -> Self {
        Self {
            title: None,
            language: "unknown".to_string(),
            probability: 0.0,
            source_url: None,
        }
    }
}

/// Render merged blocks into the final Markdown document.
pub fn render_transcript(blocks: &[TranscriptBlock], meta: &TranscriptMeta) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Video Transcript");
    let _ = writeln!(out);

    if meta.title.is_some() || meta.source_url.is_some() {
        let title = meta.title.as_deref().unwrap_or("unknown");
        let _ = writeln!(out, "> **Title:** {}", title);
        let _ = writeln!(out, ">");
        let _ = writeln!(out, "> **Language:** {}", language_display(&meta.language));
        if let Some(url) = &meta.source_url {
            let _ = writeln!(out, ">");
            let _ = writeln!(out, "> **Source:** [{}]({})", url, url);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "---");
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Transcript");
    let _ = writeln!(out);

    for block in blocks {
        // Two trailing spaces keep the time range and text on separate
        // rendered lines.
        let _ = writeln!(
            out,
            "**{} - {}**  ",
            format_timestamp(block.start),
            format_timestamp(block.end)
        );
        let _ = writeln!(out, "{}", block.text);
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "---");
    let _ = writeln!(out);
    let _ = write!(
        out,
        "*Generated at {}*",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    );

    out
}

/// Human-readable display for a language code, e.g. "中文 (zh)".
/// Unknown codes display as-is.
fn language_display(code: &str) -> String {
    match language_display_name(code) {
        Some(name) => format!("{} ({})", name, code),
        None => code.to_string(),
    }
}

/// Native-script name for a supported language code.
pub fn language_display_name(code: &str) -> Option<&'static str> {
    let name = match code {
        "zh" => "中文",
        "en" => "English",
        "ja" => "日本語",
        "ko" => "한국어",
        "es" => "Español",
        "fr" => "Français",
        "de" => "Deutsch",
        "it" => "Italiano",
        "pt" => "Português",
        "ru" => "Русский",
        "ar" => "العربية",
        "hi" => "हिन्दी",
        "th" => "ไทย",
        "vi" => "Tiếng Việt",
        "tr" => "Türkçe",
        "pl" => "Polski",
        "nl" => "Nederlands",
        "sv" => "Svenska",
        "da" => "Dansk",
        "no" => "Norsk",
        _ => return None,
    };
    Some(name)
}

/// Language codes the engine advertises as supported.
pub fn supported_languages() -> &'static [&'static str] {
    &[
        "zh", "en", "ja", "ko", "es", "fr", "de", "it", "pt", "ru", "ar", "hi", "th", "vi", "tr",
        "pl", "nl", "sv", "da", "no",
    ]
}

/// Format a timestamp for display (MM:SS, HH:MM:SS once hours appear).
pub fn format_timestamp(seconds: f64) -> String {
    let total_secs = seconds as u64;
    let secs = total_secs % 60;
    let mins = total_secs / 60;

    if mins >= 60 {
        let hours = mins / 60;
        let mins = mins % 60;
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}
