//! Synced lyrics codec
//!
//! Turns the synced-lyrics text of a provider record into a [`LyricDocument`]
//! and converts documents to and from the on-disk cache format:
//!
//! ```text
//! {"timed_lyrics": [{"seconds": 12.34, "line": "Hello world"}, ...]}
//! ```
//!
//! Only lines that start with an `mm:ss(.fraction)` stamp (brackets optional)
//! are kept. Everything else, including `[ti:...]` style tags, is dropped.
//! Lines keep the order in which the provider listed them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::lrclib::LrclibRecord;

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[?(\d{2}):(\d{2}(?:\.\d+)?)\]?").expect("timestamp pattern")
});

/// A single line of lyrics with its playback offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Offset in seconds from the start of the track
    #[serde(rename = "seconds")]
    pub offset_seconds: f64,
    /// The lyrics text
    #[serde(rename = "line")]
    pub text: String,
}

impl LyricLine {
    pub fn new(offset_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            offset_seconds,
            text: text.into(),
        }
    }
}

/// Time-indexed lyrics for one track. An empty document is a valid cache entry
/// meaning "no synced lyrics available".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LyricDocument {
    #[serde(rename = "timed_lyrics", default)]
    pub lines: Vec<LyricLine>,
}

impl LyricDocument {
    pub fn new(lines: Vec<LyricLine>) -> Self {
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Build a document from a provider record. Records without synced lyrics
    /// give an empty document.
    pub fn from_record(record: &LrclibRecord) -> Self {
        record.synced_text().map(Self::parse).unwrap_or_default()
    }

    /// Parse newline-delimited synced lyrics.
    pub fn parse(content: &str) -> Self {
        Self::new(content.lines().filter_map(parse_timed_line).collect())
    }

    /// Text of the last line whose offset is at or before `seconds`.
    ///
    /// Lines are scanned in stored order and the scan stops at the first line
    /// past `seconds`. Returns an empty string when no line qualifies.
    pub fn current_line(&self, seconds: f64) -> &str {
        let mut current = "";
        for line in &self.lines {
            if line.offset_seconds <= seconds {
                current = &line.text;
            } else {
                break;
            }
        }
        current
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Parse a line like `[01:02.50]Hello` into a [`LyricLine`].
fn parse_timed_line(line: &str) -> Option<LyricLine> {
    let caps = TIMESTAMP.captures(line)?;
    let minutes: u32 = caps.get(1)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(2)?.as_str().parse().ok()?;
    let end = caps.get(0)?.end();
    Some(LyricLine::new(
        f64::from(minutes) * 60.0 + seconds,
        line[end..].trim(),
    ))
}

/// Format an offset as `mm:ss.xx` for display.
pub fn format_offset(seconds: f64) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    format!(
        "{:02}:{:02}.{:02}",
        centis / 6000,
        (centis / 100) % 60,
        centis % 100
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(synced: Option<&str>, lrc: Option<&str>) -> LrclibRecord {
        LrclibRecord {
            synced_lyrics: synced.map(str::to_string),
            lrc: lrc.map(str::to_string),
            ..LrclibRecord::default()
        }
    }

    #[test]
    fn test_parse_timestamp_line() {
        let line = parse_timed_line("[01:02.50]Hello").unwrap();
        assert_eq!(line.offset_seconds, 62.5);
        assert_eq!(line.text, "Hello");

        let bare = parse_timed_line("00:12 no brackets ").unwrap();
        assert_eq!(bare.offset_seconds, 12.0);
        assert_eq!(bare.text, "no brackets");
    }

    #[test]
    fn test_unmatched_lines_are_dropped() {
        let lrc = r#"
[ti:Test Song]
[ar:Test Artist]
[00:12.34]First line
not a lyric line
[1:05]single digit minute
[00:15.00]Second line
"#;
        let doc = LyricDocument::parse(lrc);
        assert_eq!(doc.len(), 2);
        assert!((doc.lines[0].offset_seconds - 12.34).abs() < 1e-9);
        assert_eq!(doc.lines[0].text, "First line");
        assert_eq!(doc.lines[1].text, "Second line");
    }

    #[test]
    fn test_empty_timestamp_text_kept() {
        let doc = LyricDocument::parse("[00:10.00]\n[00:11.00] x ");
        assert_eq!(doc.lines[0].text, "");
        assert_eq!(doc.lines[1].text, "x");
    }

    #[test]
    fn test_order_is_preserved() {
        let doc = LyricDocument::parse("[00:20.00]B\n[00:10.00]A\n[00:10.00]A2");
        let texts: Vec<_> = doc.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["B", "A", "A2"]);
    }

    #[test]
    fn test_from_record_field_precedence() {
        let doc = LyricDocument::from_record(&record(Some("[00:01.00]synced"), Some("[00:02.00]lrc")));
        assert_eq!(doc.lines[0].text, "synced");

        let doc = LyricDocument::from_record(&record(Some("   "), Some("[00:02.00]lrc")));
        assert_eq!(doc.lines[0].text, "lrc");

        assert!(LyricDocument::from_record(&record(None, None)).is_empty());
        assert!(LyricDocument::from_record(&record(Some(""), None)).is_empty());
    }

    #[test]
    fn test_cache_format_round_trip() {
        let doc = LyricDocument::parse("[00:00.00]A\n[00:10.12]B\n[01:02.50]C\n[00:05.00]late");
        let raw = doc.to_json().unwrap();
        assert!(raw.starts_with(r#"{"timed_lyrics":[{"seconds":0.0,"line":"A"}"#));
        assert_eq!(LyricDocument::from_json(&raw).unwrap(), doc);
    }

    #[test]
    fn test_cache_format_missing_key_is_empty() {
        assert!(LyricDocument::from_json("{}").unwrap().is_empty());
        assert!(LyricDocument::from_json("{\"timed_lyrics\": 5}").is_err());
    }

    #[test]
    fn test_current_line_lookup() {
        let doc = LyricDocument::new(vec![
            LyricLine::new(0.0, "A"),
            LyricLine::new(10.0, "B"),
            LyricLine::new(20.0, "C"),
        ]);
        assert_eq!(doc.current_line(9.9), "A");
        assert_eq!(doc.current_line(10.0), "B");
        assert_eq!(doc.current_line(25.0), "C");
        assert_eq!(doc.current_line(-1.0), "");
        assert_eq!(LyricDocument::default().current_line(5.0), "");
    }

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(62.5), "01:02.50");
        assert_eq!(format_offset(0.0), "00:00.00");
        assert_eq!(format_offset(-3.0), "00:00.00");
    }
}
