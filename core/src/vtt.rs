//! Minimal WebVTT reader: turns a caption file into an ordered list of cues.
//!
//! Only what the indexer needs is understood: the `WEBVTT` header, optional
//! cue identifiers, timing lines with trailing cue settings, and multi-line
//! payloads. `NOTE`, `STYLE` and `REGION` blocks are skipped and inline cue
//! tags (`<c>`, `<00:00:01.000>`, ...) are removed from the text.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    static ref TIMESTAMP: Regex = Regex::new(r"^(?:(\d+):)?([0-5]\d):([0-5]\d)\.(\d{3})$").expect("valid regex");
    static ref TAG: Regex = Regex::new(r"<[^>]*>").expect("valid regex");
    static ref VIDEO_ID: Regex = Regex::new(r"\[([^\[\]]+)\](?:\.[\w-]+)?\.vtt$").expect("valid regex");
}

/// One caption cue as it appears in the source track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub start_ms: u64,
    pub end_ms: u64,
    /// Payload with tags removed; lines joined by `\n`.
    pub text: String,
}

impl Cue {
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self { start_ms, end_ms, text: text.into() }
    }

    /// Whole seconds, fractional part truncated.
    pub fn start_secs(&self) -> u32 { (self.start_ms / 1000) as u32 }

    pub fn end_secs(&self) -> u32 { (self.end_ms / 1000) as u32 }
}

/// Video id from a caption file name such as `Some Title [dQw4w9WgXcQ].en.vtt`.
pub fn video_id_from_file_name(name: &str) -> Option<&str> {
    VIDEO_ID.captures(name).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn parse_timestamp(raw: &str) -> Option<u64> {
    let caps = TIMESTAMP.captures(raw.trim())?;
    let num = |i: usize| caps.get(i).map_or(Ok(0), |m| m.as_str().parse::<u64>());
    let (h, m, s, ms) = (num(1).ok()?, num(2).ok()?, num(3).ok()?, num(4).ok()?);
    Some(((h * 60 + m) * 60 + s) * 1000 + ms)
}

fn clean_payload(lines: &[&str]) -> String {
    let joined = lines.join("\n");
    TAG.replace_all(&joined, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Parse WebVTT text. `file` is only used to label errors.
pub fn parse_vtt(file: &str, input: &str) -> Result<Vec<Cue>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input).replace("\r\n", "\n");

    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in input.split('\n') {
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    let mut blocks = blocks.into_iter();
    match blocks.next() {
        Some(header) if header[0].starts_with("WEBVTT") => {}
        _ => return Err(Error::caption(file, 0, "missing WEBVTT header")),
    }

    let mut cues = Vec::new();
    for block in blocks {
        if ["NOTE", "STYLE", "REGION"].iter().any(|kw| block[0].starts_with(*kw)) {
            continue;
        }
        let cue_no = cues.len() + 1;
        let timing_at = match block.iter().take(2).position(|l| l.contains("-->")) {
            Some(i) => i,
            None => return Err(Error::caption(file, cue_no, "cue without timing line")),
        };
        let timing = block[timing_at];
        let (left, right) = timing.split_once("-->").unwrap_or((timing, ""));
        let end_raw = right.split_whitespace().next().unwrap_or("");
        let start_ms = parse_timestamp(left)
            .ok_or_else(|| Error::caption(file, cue_no, format!("bad start time {:?}", left.trim())))?;
        let end_ms = parse_timestamp(end_raw)
            .ok_or_else(|| Error::caption(file, cue_no, format!("bad end time {end_raw:?}")))?;
        // Inverted ranges show up in real tracks and are kept as written.
        let payload = &block[timing_at + 1..];
        if payload.is_empty() {
            return Err(Error::caption(file, cue_no, "cue has no text"));
        }
        cues.push(Cue { start_ms, end_ms, text: clean_payload(payload) });
    }
    Ok(cues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cues_with_identifiers_and_settings() {
        let vtt = "WEBVTT\nKind: captions\n\n1\n00:00:01.500 --> 00:00:03.000 align:start position:0%\nhello <c>there</c>\n\nNOTE skipped\n\n00:04.000 --> 00:05.250\nline one\nline two\n";
        let cues = parse_vtt("a.vtt", vtt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0], Cue::new(1500, 3000, "hello there"));
        assert_eq!(cues[0].start_secs(), 1);
        assert_eq!(cues[1].text, "line one\nline two");
        assert_eq!(cues[1].end_secs(), 5);
    }

    #[test]
    fn strips_inline_timestamps() {
        let vtt = "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nso<00:00:00.500><c> this</c><00:00:01.000><c> works</c>\n";
        let cues = parse_vtt("a.vtt", vtt).unwrap();
        assert_eq!(cues[0].text, "so this works");
    }

    #[test]
    fn rejects_bad_time_code() {
        let vtt = "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nok\n\n00:00:aa.000 --> 00:00:03.000\nbroken\n";
        match parse_vtt("bad.vtt", vtt) {
            Err(Error::MalformedCaption { file, cue, .. }) => {
                assert_eq!(file, "bad.vtt");
                assert_eq!(cue, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn keeps_cue_that_ends_before_it_starts() {
        let vtt = "WEBVTT\n\n00:00:05.000 --> 00:00:04.000\nbackwards\n\n00:00:06.000 --> 00:00:07.000\nnext\n";
        let cues = parse_vtt("inverted.vtt", vtt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!((cues[0].start_ms, cues[0].end_ms), (5000, 4000));
        assert_eq!(cues[0].text, "backwards");
    }

    #[test]
    fn rejects_missing_header_and_missing_text() {
        assert!(parse_vtt("x.vtt", "00:00:01.000 --> 00:00:02.000\nhi\n").is_err());
        assert!(parse_vtt("x.vtt", "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\n").is_err());
    }

    #[test]
    fn video_id_from_name() {
        assert_eq!(video_id_from_file_name("My Stream [abc_12-3].en.vtt"), Some("abc_12-3"));
        assert_eq!(video_id_from_file_name("clip [x9].vtt"), Some("x9"));
        assert_eq!(video_id_from_file_name("no id here.en.vtt"), None);
    }
}
