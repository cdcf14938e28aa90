//! SRT, WebVTT, and ASS/SSA cue parsers.
//!
//! Hand-rolled line scanners. Malformed or empty cues are skipped, never
//! fatal; an unparsable timestamp resolves to 0.0 instead of dropping the
//! cue's neighbours.

use std::iter::Peekable;

use crate::transcript::Segment;

/// Subtitle formats the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Vtt,
    Ass,
}

impl SubtitleFormat {
    /// Map a file extension to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "srt" => Some(SubtitleFormat::Srt),
            "vtt" => Some(SubtitleFormat::Vtt),
            "ass" | "ssa" => Some(SubtitleFormat::Ass),
            _ => None,
        }
    }

    /// Guess the format from content when no extension is available.
    /// A `WEBVTT` magic near the top means VTT; the SRT scanner tolerates
    /// everything else.
    pub fn sniff(content: &str) -> Self {
        let head: String = content.chars().take(50).collect();
        if head.contains("WEBVTT") {
            SubtitleFormat::Vtt
        } else {
            SubtitleFormat::Srt
        }
    }
}

/// Parse raw cue text in the given format into ordered segments.
pub fn parse(content: &str, format: SubtitleFormat) -> Vec<Segment> {
    match format {
        SubtitleFormat::Srt => parse_srt(content),
        SubtitleFormat::Vtt => parse_vtt(content),
        SubtitleFormat::Ass => parse_ass(content),
    }
}

/// SRT: index line, `start --> end`, text lines, blank-line terminator.
/// The index line is not required here; any line with an arrow opens a cue.
fn parse_srt(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        if !line.contains("-->") {
            continue;
        }
        if let Some(seg) = read_cue(line, &mut lines) {
            segments.push(seg);
        }
    }

    segments
}

/// WebVTT: drops the `WEBVTT` header block and any `STYLE`/`NOTE` block,
/// then scans cues like SRT. Numeric cue identifiers and trailing cue
/// settings after the end timestamp are ignored.
fn parse_vtt(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.starts_with("WEBVTT")
            || trimmed.starts_with("STYLE")
            || trimmed.starts_with("NOTE")
        {
            // These blocks run to the next blank line.
            while lines.next_if(|l| !l.trim().is_empty()).is_some() {}
            continue;
        }
        if !line.contains("-->") {
            continue;
        }
        if let Some(seg) = read_cue(line, &mut lines) {
            segments.push(seg);
        }
    }

    segments
}

/// ASS/SSA: only `Dialogue:` lines carry cues. Fields are comma-separated
/// with the text as the tenth field (which may itself contain commas).
/// Dialogue lines carry no ordering guarantee, so cues are re-sorted.
fn parse_ass(content: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();

    for line in content.lines() {
        let Some(rest) = line.trim_start().strip_prefix("Dialogue:") else {
            continue;
        };

        let fields: Vec<&str> = rest.splitn(10, ',').collect();
        if fields.len() < 10 {
            continue;
        }

        let text = clean_ass_text(fields[9]);
        if text.is_empty() {
            continue;
        }

        segments.push(Segment {
            start: parse_timestamp(fields[1]),
            end: parse_timestamp(fields[2]),
            text,
        });
    }

    segments.sort_by(|a, b| {
        a.start
            .partial_cmp(&b.start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    segments
}

/// Consume one cue given its timing line: gathers text lines until the
/// blank-line terminator. Returns `None` for malformed or empty cues.
fn read_cue<'a, I>(timing_line: &str, lines: &mut Peekable<I>) -> Option<Segment>
where
    I: Iterator<Item = &'a str>,
{
    let (start, end) = parse_timing_line(timing_line)?;

    let mut text_lines: Vec<&str> = Vec::new();
    while let Some(text) = lines.next_if(|l| !l.trim().is_empty()) {
        text_lines.push(text);
    }

    let text = clean_cue_text(&text_lines.join(" "));
    if text.is_empty() {
        return None;
    }

    Some(Segment { start, end, text })
}

/// Split `start --> end [settings...]` into parsed endpoints.
fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (lhs, rhs) = line.split_once("-->")?;
    let end_raw = rhs.split_whitespace().next()?;
    Some((parse_timestamp(lhs), parse_timestamp(end_raw)))
}

/// Parse a subtitle timestamp: `HH:MM:SS.mmm`, `MM:SS.mmm`, bare seconds,
/// ASS-style `H:MM:SS.cc`, with `,` accepted as the decimal separator.
/// Unparsable input resolves to 0.0.
pub fn parse_timestamp(raw: &str) -> f64 {
    let cleaned = raw.trim().replace(',', ".");
    let parts: Vec<&str> = cleaned.split(':').collect();

    let parsed = match parts.as_slice() {
        [hours, minutes, seconds] => match (
            hours.parse::<u64>(),
            minutes.parse::<u64>(),
            seconds.parse::<f64>(),
        ) {
            (Ok(h), Ok(m), Ok(s)) => Some(h as f64 * 3600.0 + m as f64 * 60.0 + s),
            _ => None,
        },
        [minutes, seconds] => match (minutes.parse::<u64>(), seconds.parse::<f64>()) {
            (Ok(m), Ok(s)) => Some(m as f64 * 60.0 + s),
            _ => None,
        },
        [seconds] => seconds.parse::<f64>().ok(),
        _ => None,
    };

    parsed.unwrap_or(0.0)
}

/// Strip `<...>` markup and collapse whitespace runs.
fn clean_cue_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;

    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }

    collapse_whitespace(&out)
}

/// Strip `{...}` override tags, turn `\N`/`\n` escapes into spaces, and
/// collapse whitespace runs.
fn clean_ass_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_tag = false;

    while let Some(ch) = chars.next() {
        match ch {
            '{' => in_tag = true,
            '}' if in_tag => in_tag = false,
            '\\' if !in_tag => match chars.peek() {
                Some('N') | Some('n') => {
                    chars.next();
                    out.push(' ');
                }
                _ => out.push('\\'),
            },
            c if !in_tag => out.push(c),
            _ => {}
        }
    }

    collapse_whitespace(&out)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srt_basic() {
        let content = "1\n00:00:01,000 --> 00:00:02,500\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nWorld\n";
        let segs = parse(content, SubtitleFormat::Srt);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].start, 1.0);
        assert_eq!(segs[0].end, 2.5);
        assert_eq!(segs[0].text, "Hello");
        assert_eq!(segs[1].text, "World");
    }

    #[test]
    fn test_parse_srt_dot_decimal_and_markup() {
        let content = "1\n00:00:01.000 --> 00:00:02.000\n<i>Styled</i> text\n";
        let segs = parse(content, SubtitleFormat::Srt);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "Styled text");
    }

    #[test]
    fn test_parse_srt_multiline_and_malformed() {
        let content = "1\n00:00:01,000 --> 00:00:02,000\nline one\nline two\n\norphan text without timing\n\n3\n00:00:05,000 --> 00:00:06,000\nok\n";
        let segs = parse(content, SubtitleFormat::Srt);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].text, "line one line two");
        assert_eq!(segs[1].text, "ok");
    }

    #[test]
    fn test_parse_srt_empty_text_skipped() {
        let content = "1\n00:00:01,000 --> 00:00:02,000\n<i></i>\n\n2\n00:00:03,000 --> 00:00:04,000\nkept\n";
        let segs = parse(content, SubtitleFormat::Srt);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "kept");
    }

    #[test]
    fn test_parse_vtt_headers_and_settings() {
        let content = "WEBVTT\nKind: captions\n\nSTYLE\n::cue { color: red }\n\nNOTE a comment\nspanning lines\n\n1\n00:01.000 --> 00:04.000 position:10% align:center\nShort form\n\n00:01:05.000 --> 00:01:07.000\nLong form\n";
        let segs = parse(content, SubtitleFormat::Vtt);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].start, 1.0);
        assert_eq!(segs[0].end, 4.0);
        assert_eq!(segs[0].text, "Short form");
        assert_eq!(segs[1].start, 65.0);
        assert_eq!(segs[1].text, "Long form");
    }

    #[test]
    fn test_parse_ass_dialogue() {
        let content = "\
[Script Info]\nTitle: demo\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n\
Dialogue: 0,0:00:05.00,0:00:07.00,Default,,0,0,0,,Second{\\an8} line\\Nwrapped\n\
Comment: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,not a cue\n\
Dialogue: 0,0:00:01.50,0:00:03.00,Default,,0,0,0,,First, with comma\n";
        let segs = parse(content, SubtitleFormat::Ass);
        assert_eq!(segs.len(), 2);
        // Re-sorted by start time.
        assert_eq!(segs[0].start, 1.5);
        assert_eq!(segs[0].text, "First, with comma");
        assert_eq!(segs[1].text, "Second line wrapped");
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert_eq!(parse_timestamp("00:00:05,500"), 5.5);
        assert_eq!(parse_timestamp("01:02:03.250"), 3723.25);
        assert_eq!(parse_timestamp("05:10.5"), 310.5);
        assert_eq!(parse_timestamp("7.25"), 7.25);
        assert_eq!(parse_timestamp("0:00:01.00"), 1.0);
        assert_eq!(parse_timestamp("garbage"), 0.0);
        assert_eq!(parse_timestamp("1:2:3:4"), 0.0);
    }

    #[test]
    fn test_sniff_and_extension() {
        assert_eq!(SubtitleFormat::sniff("WEBVTT\n\n00:01.000 --> 00:02.000\nhi"), SubtitleFormat::Vtt);
        assert_eq!(SubtitleFormat::sniff("1\n00:00:01,000 --> 00:00:02,000\nhi"), SubtitleFormat::Srt);
        assert_eq!(SubtitleFormat::from_extension("SRT"), Some(SubtitleFormat::Srt));
        assert_eq!(SubtitleFormat::from_extension("ssa"), Some(SubtitleFormat::Ass));
        assert_eq!(SubtitleFormat::from_extension("mkv"), None);
    }

    #[test]
    fn test_chronological_output_with_end_after_start() {
        let content = "1\n00:00:01,000 --> 00:00:02,000\na\n\n2\n00:00:02,000 --> 00:00:04,000\nb\n\n3\n00:00:04,500 --> 00:00:05,000\nc\n";
        let segs = parse(content, SubtitleFormat::Srt);
        assert_eq!(segs.len(), 3);
        for pair in segs.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
        for seg in &segs {
            assert!(seg.end >= seg.start);
        }
    }
}
