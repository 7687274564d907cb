//! Caption track -> [`VideoDocument`].
//!
//! The acceptance rules here decide what a segment is, and segment positions
//! are what the inverted index addresses, so they must stay stable across
//! runs for the same input.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::builder::title_from_file_name;
use crate::error::{Error, Result};
use crate::index::{FullTranscript, LocalWordMap, Segment, SegmentIndex, UploadDate, VideoDocument, VideoId};
use crate::tokenizer::tokenize;
use crate::vtt::{parse_vtt, video_id_from_file_name, Cue};

lazy_static! {
    static ref BRACKETED: Regex = Regex::new(r"\[.*?\]").expect("valid regex");
}

/// Identity of a caption track, supplied by the caller.
#[derive(Debug, Clone)]
pub struct CaptionSource<'a> {
    pub video_id: &'a str,
    /// File name the track came from; the title is derived from it.
    pub file_name: &'a str,
    pub upload_date: UploadDate,
}

/// Build a document from the cues of one track.
///
/// A cue is dropped when its cleaned text is empty or spans several lines,
/// when an earlier accepted cue already started in the same second, or when
/// it repeats the previous accepted segment verbatim.
pub fn parse_document(source: &CaptionSource<'_>, cues: &[Cue]) -> VideoDocument {
    let mut segments: Vec<Segment> = Vec::new();
    let mut word_map = LocalWordMap::new();
    let mut full = FullTranscript::default();
    let mut seen_starts: HashSet<u32> = HashSet::new();
    let mut offset = 0usize;

    for cue in cues {
        let start = cue.start_secs();
        let text = BRACKETED.replace_all(&cue.text, "").trim().to_lowercase();

        if text.is_empty() || text.contains('\n') { continue; }
        if seen_starts.contains(&start) { continue; }
        if segments.last().is_some_and(|prev| prev.text == text) { continue; }

        seen_starts.insert(start);
        let idx = segments.len() as SegmentIndex;
        for word in tokenize(&text) {
            word_map.entry(word.to_string()).or_default().insert(idx);
        }

        full.text.push(' ');
        full.text.push_str(&text);
        offset += 1 + text.chars().count();
        full.offset_to_time.insert(offset, cue.end_secs());

        segments.push(Segment { start, text });
    }

    tracing::debug!(video_id = source.video_id, cues = cues.len(), accepted = segments.len(), "parsed caption track");

    VideoDocument {
        video_id: source.video_id.to_string(),
        title: title_from_file_name(source.file_name),
        upload_date: source.upload_date,
        source: source.file_name.to_string(),
        segments,
        word_map,
        full,
    }
}

/// Read one `.vtt` file. The video id comes from the file name and the upload
/// date from `dates`; either missing is an error, as is any malformed cue.
pub fn parse_caption_file(path: &Path, dates: &HashMap<VideoId, UploadDate>) -> Result<VideoDocument> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::UnrecognizedFileName(path.display().to_string()))?;
    let video_id = video_id_from_file_name(file_name)
        .ok_or_else(|| Error::UnrecognizedFileName(file_name.to_string()))?;
    let upload_date = *dates
        .get(video_id)
        .ok_or_else(|| Error::MissingUploadDate(video_id.to_string()))?;

    let raw = fs::read_to_string(path)?;
    let cues = parse_vtt(&path.display().to_string(), &raw)?;
    Ok(parse_document(&CaptionSource { video_id, file_name, upload_date }, &cues))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn source() -> CaptionSource<'static> {
        CaptionSource {
            video_id: "v1",
            file_name: "Stream Title [v1].en.vtt",
            upload_date: UploadDate::parse("20240101").unwrap(),
        }
    }

    fn secs(start: u64, end: u64, text: &str) -> Cue {
        Cue::new(start * 1000, end * 1000, text)
    }

    #[test]
    fn dedups_on_start_time() {
        let doc = parse_document(&source(), &[secs(0, 1, "hello"), secs(0, 2, "hello world")]);
        assert_eq!(doc.segments, vec![Segment { start: 0, text: "hello".into() }]);
    }

    #[test]
    fn dedup_uses_whole_seconds() {
        let cues = [Cue::new(1_200, 2_000, "one"), Cue::new(1_900, 3_000, "two")];
        let doc = parse_document(&source(), &cues);
        assert_eq!(doc.segments.len(), 1);
    }

    #[test]
    fn excludes_stop_words() {
        let doc = parse_document(&source(), &[secs(0, 2, "the cat sat")]);
        assert_eq!(doc.word_map.len(), 2);
        assert_eq!(doc.word_map["cat"], BTreeSet::from([0]));
        assert_eq!(doc.word_map["sat"], BTreeSet::from([0]));
        assert!(!doc.word_map.contains_key("the"));
    }

    #[test]
    fn drops_annotations_empty_multiline_and_repeats() {
        let cues = [
            secs(0, 1, "[Music]"),
            secs(1, 2, "Hello [laughs] There"),
            secs(2, 3, "hello  there"),
            secs(3, 4, "hello there"),
            secs(4, 5, "first line\nsecond line"),
            secs(5, 6, "cat cat cat"),
        ];
        let doc = parse_document(&source(), &cues);
        let texts: Vec<&str> = doc.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["hello  there", "hello there", "cat cat cat"]);
        assert_eq!(doc.word_map["cat"], BTreeSet::from([2]));
        assert_eq!(doc.word_map["hello"], BTreeSet::from([0, 1]));
    }

    #[test]
    fn builds_full_text_and_offsets() {
        let doc = parse_document(&source(), &[secs(0, 2, "ab"), secs(2, 7, "cde")]);
        assert_eq!(doc.full.text, " ab cde");
        let offsets: Vec<(usize, u32)> = doc.full.offset_to_time.iter().map(|(&k, &v)| (k, v)).collect();
        assert_eq!(offsets, vec![(3, 2), (7, 7)]);
        assert_eq!(doc.full.time_at_offset(5), 2);
    }

    #[test]
    fn offsets_count_characters() {
        let doc = parse_document(&source(), &[secs(0, 4, "café")]);
        assert_eq!(doc.full.offset_to_time.keys().copied().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn title_and_identity_come_from_source() {
        let doc = parse_document(&source(), &[]);
        assert_eq!(doc.video_id, "v1");
        assert_eq!(doc.title, "Stream Title");
        assert!(doc.segments.is_empty());
        assert!(doc.full.text.is_empty());
    }

    #[test]
    fn parsing_is_deterministic() {
        let cues = [secs(0, 1, "alpha beta"), secs(1, 2, "beta gamma"), secs(2, 3, "[x] gamma")];
        let a = parse_document(&source(), &cues);
        let b = parse_document(&source(), &cues);
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn caption_file_requires_known_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Show [abc].en.vtt");
        fs::write(&path, "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHi there\n").unwrap();

        let mut dates = HashMap::new();
        assert!(matches!(parse_caption_file(&path, &dates), Err(Error::MissingUploadDate(_))));

        dates.insert("abc".to_string(), UploadDate::parse("20200101").unwrap());
        let doc = parse_caption_file(&path, &dates).unwrap();
        assert_eq!(doc.video_id, "abc");
        assert_eq!(doc.title, "Show");
        assert_eq!(doc.segments[0].text, "hi there");
    }
}
