use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

pub type VideoId = String;
pub type SegmentIndex = u32;

/// Word index of a single video: word -> indexes of the segments containing it.
pub type LocalWordMap = BTreeMap<String, BTreeSet<SegmentIndex>>;

/// Corpus-wide inverted index: word -> video -> segment indexes.
pub type WordMap = BTreeMap<String, BTreeMap<VideoId, BTreeSet<SegmentIndex>>>;

/// One accepted caption line. Its index is its position in the owning
/// video's segment list; it is serialized as `[start, text]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, String)", into = "(u32, String)")]
pub struct Segment {
    /// Start of the caption in whole seconds.
    pub start: u32,
    pub text: String,
}

impl From<(u32, String)> for Segment {
    fn from((start, text): (u32, String)) -> Self {
        Self { start, text }
    }
}

impl From<Segment> for (u32, String) {
    fn from(seg: Segment) -> Self {
        (seg.start, seg.text)
    }
}

/// Upload date normalized to `YYYYMMDD`.
///
/// The date table and older snapshots may carry either the compact integer
/// form or an ISO `YYYY-MM-DD` string; both are accepted and stored compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UploadDate(u32);

impl UploadDate {
    pub fn from_compact(value: u32) -> std::result::Result<Self, String> {
        let (year, month, day) = (value / 10_000, (value / 100) % 100, value % 100);
        let month = time::Month::try_from(month as u8).map_err(|e| format!("{value}: {e}"))?;
        time::Date::from_calendar_date(year as i32, month, day as u8)
            .map_err(|e| format!("{value}: {e}"))?;
        Ok(Self(value))
    }

    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            let value: u32 = raw.parse().map_err(|e| format!("{raw}: {e}"))?;
            return Self::from_compact(value);
        }
        let date = time::Date::parse(raw, time::macros::format_description!("[year]-[month]-[day]"))
            .map_err(|e| format!("{raw}: {e}"))?;
        Ok(Self(date.year() as u32 * 10_000 + u8::from(date.month()) as u32 * 100 + date.day() as u32))
    }

    pub fn as_compact(self) -> u32 {
        self.0
    }
}

impl<'de> Deserialize<'de> for UploadDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            #[derive(Deserialize)]
            #[serde(untagged)]
            enum Raw {
                Compact(u32),
                Text(String),
            }
            match Raw::deserialize(deserializer)? {
                Raw::Compact(n) => UploadDate::from_compact(n),
                Raw::Text(s) => UploadDate::parse(&s),
            }
            .map_err(de::Error::custom)
        } else {
            u32::deserialize(deserializer).map(UploadDate)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub title: String,
    pub upload_date: UploadDate,
}

/// Concatenated transcript of one video plus the offset -> time map used to
/// resolve substring matches to a playback position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTranscript {
    pub text: String,
    /// Character offset just past a segment's text -> end time of that caption.
    #[serde(rename = "idx_to_time")]
    pub offset_to_time: BTreeMap<usize, u32>,
}

impl FullTranscript {
    /// Playback time for a character offset: the time recorded at the nearest
    /// offset at or before it, or 0 when the offset precedes every caption end.
    pub fn time_at_offset(&self, offset: usize) -> u32 {
        self.offset_to_time
            .range(..=offset)
            .next_back()
            .map(|(_, &t)| t)
            .unwrap_or(0)
    }
}

/// Everything parsed out of one caption file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDocument {
    pub video_id: VideoId,
    pub title: String,
    pub upload_date: UploadDate,
    /// Caption file the document was parsed from, for error reporting.
    pub source: String,
    pub segments: Vec<Segment>,
    pub word_map: LocalWordMap,
    pub full: FullTranscript,
}

impl VideoDocument {
    pub fn segment(&self, index: SegmentIndex) -> Option<&Segment> {
        self.segments.get(index as usize)
    }
}

/// The published dataset: compact view (`segments`, `word_map`, `meta`) plus
/// the extended `full` view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pub segments: BTreeMap<VideoId, Vec<Segment>>,
    pub word_map: WordMap,
    pub meta: BTreeMap<VideoId, VideoMeta>,
    pub full: BTreeMap<VideoId, FullTranscript>,
    pub updated_at: String,
}

impl Corpus {
    pub fn new(updated_at: impl Into<String>) -> Self {
        Self { updated_at: updated_at.into(), ..Self::default() }
    }

    pub fn num_videos(&self) -> usize {
        self.segments.len()
    }

    pub fn contains_video(&self, video_id: &str) -> bool {
        self.segments.contains_key(video_id)
    }

    /// Segments containing `word`, grouped by video.
    pub fn segments_for_word(&self, word: &str) -> BTreeMap<&str, Vec<&Segment>> {
        let mut out = BTreeMap::new();
        let Some(videos) = self.word_map.get(&word.to_lowercase()) else { return out };
        for (vid, idxs) in videos {
            let Some(segments) = self.segments.get(vid) else { continue };
            let hits: Vec<&Segment> = idxs.iter().filter_map(|&i| segments.get(i as usize)).collect();
            if !hits.is_empty() {
                out.insert(vid.as_str(), hits);
            }
        }
        out
    }

    /// `segments`, `meta` and `full` must describe the same videos.
    pub fn check_keys(&self, origin: &str) -> Result<()> {
        if !self.meta.keys().eq(self.segments.keys()) {
            return Err(Error::corpus(origin, "meta and segments cover different videos"));
        }
        if !self.full.keys().eq(self.segments.keys()) {
            return Err(Error::corpus(origin, "full and segments cover different videos"));
        }
        Ok(())
    }

    /// Check the structural invariants: identical video key sets, no empty
    /// index entries, and every indexed `(video, segment)` pair pointing at
    /// an existing segment.
    pub fn validate(&self, origin: &str) -> Result<()> {
        self.check_keys(origin)?;
        for (word, videos) in &self.word_map {
            if videos.is_empty() {
                return Err(Error::corpus(origin, format!("word {word:?} has no videos")));
            }
            for (vid, idxs) in videos {
                let Some(segments) = self.segments.get(vid) else {
                    return Err(Error::corpus(origin, format!("word {word:?} references unknown video {vid}")));
                };
                if idxs.is_empty() {
                    return Err(Error::corpus(origin, format!("word {word:?} has an empty entry for {vid}")));
                }
                if let Some(&bad) = idxs.iter().find(|&&i| i as usize >= segments.len()) {
                    return Err(Error::corpus(
                        origin,
                        format!("word {word:?} references segment {bad} of {vid}, which has {}", segments.len()),
                    ));
                }
            }
        }
        Ok(())
    }
}
