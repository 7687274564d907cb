//! Assembles the documents of one run into a [`Corpus`].

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::index::{Corpus, VideoDocument, VideoId, VideoMeta};

lazy_static! {
    static ref TITLE_SUFFIX: Regex = Regex::new(r" \[.*$").expect("valid regex");
}

/// Title from a caption file name: `"Some Stream [abc123].en.vtt"` becomes
/// `"Some Stream"`. Everything from the first space-preceded `[` is dropped, so a
/// bracket at the very start of the name stays part of the title.
pub fn title_from_file_name(file_name: &str) -> String {
    TITLE_SUFFIX.replace(file_name, "").into_owned()
}

/// Accumulates documents into a corpus, one video id at a time.
///
/// Each video may be added once per run. A second document for the same id
/// means two source files map to one video, which is reported rather than
/// resolved.
#[derive(Default)]
pub struct CorpusBuilder {
    corpus: Corpus,
    sources: HashMap<VideoId, String>,
}

impl CorpusBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.sources.len() }

    pub fn is_empty(&self) -> bool { self.sources.is_empty() }

    pub fn add(&mut self, doc: VideoDocument) -> Result<()> {
        if let Some(first) = self.sources.get(&doc.video_id) {
            return Err(Error::DuplicateVideo {
                video_id: doc.video_id,
                first: first.clone(),
                second: doc.source,
            });
        }

        let VideoDocument { video_id, title, upload_date, source, segments, word_map, full } = doc;
        for (word, idxs) in word_map {
            self.corpus.word_map.entry(word).or_default().insert(video_id.clone(), idxs);
        }
        self.corpus.segments.insert(video_id.clone(), segments);
        self.corpus.meta.insert(video_id.clone(), VideoMeta { title, upload_date });
        self.corpus.full.insert(video_id.clone(), full);
        self.sources.insert(video_id, source);
        Ok(())
    }

    pub fn finish(self, updated_at: impl Into<String>) -> Corpus {
        let mut corpus = self.corpus;
        corpus.updated_at = updated_at.into();
        tracing::info!(videos = corpus.num_videos(), words = corpus.word_map.len(), "built corpus");
        corpus
    }
}

/// Build a corpus from every document of a run.
pub fn build_corpus<I>(docs: I, updated_at: impl Into<String>) -> Result<Corpus>
where
    I: IntoIterator<Item = VideoDocument>,
{
    let mut builder = CorpusBuilder::new();
    for doc in docs {
        builder.add(doc)?;
    }
    Ok(builder.finish(updated_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::{parse_document, CaptionSource};
    use crate::index::UploadDate;
    use crate::vtt::Cue;
    use std::collections::BTreeSet;

    fn doc(vid: &str, file: &str, lines: &[&str]) -> VideoDocument {
        let cues: Vec<Cue> = lines
            .iter()
            .enumerate()
            .map(|(i, t)| Cue::new(i as u64 * 1000, i as u64 * 1000 + 900, *t))
            .collect();
        let source = CaptionSource { video_id: vid, file_name: file, upload_date: UploadDate::parse("20240301").unwrap() };
        parse_document(&source, &cues)
    }

    #[test]
    fn titles_drop_bracketed_suffix() {
        assert_eq!(title_from_file_name("Late Night Stream [abc123].en.vtt"), "Late Night Stream");
        assert_eq!(title_from_file_name("plain"), "plain");
        assert_eq!(title_from_file_name("[VOD] Late Stream [abc123].en.vtt"), "[VOD] Late Stream");
    }

    #[test]
    fn unions_word_maps_by_video() {
        let corpus = build_corpus(
            vec![doc("a", "A [a].en.vtt", &["red fish", "blue fish"]), doc("b", "B [b].en.vtt", &["one fish"])],
            "2024-03-01T00:00:00Z",
        )
        .unwrap();

        assert_eq!(corpus.num_videos(), 2);
        assert_eq!(corpus.word_map["fish"]["a"], BTreeSet::from([0, 1]));
        assert_eq!(corpus.word_map["fish"]["b"], BTreeSet::from([0]));
        assert_eq!(corpus.meta["a"].title, "A");
        assert_eq!(corpus.full["b"].text, " one fish");
        assert_eq!(corpus.updated_at, "2024-03-01T00:00:00Z");
        corpus.validate("built").unwrap();
    }

    #[test]
    fn rejects_duplicate_video() {
        let docs = vec![doc("a", "A [a].en.vtt", &["x"]), doc("a", "A again [a].en.vtt", &["y"])];
        match build_corpus(docs, "now") {
            Err(Error::DuplicateVideo { video_id, first, second }) => {
                assert_eq!(video_id, "a");
                assert_eq!(first, "A [a].en.vtt");
                assert_eq!(second, "A again [a].en.vtt");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_run_builds_empty_corpus() {
        let corpus = build_corpus(Vec::new(), "now").unwrap();
        assert_eq!(corpus.num_videos(), 0);
        assert!(corpus.word_map.is_empty());
    }
}
