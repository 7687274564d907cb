//! Transcript indexing and merge engine.
//!
//! Caption tracks are parsed into [`VideoDocument`]s, assembled into a
//! [`Corpus`] per run, and merged over the previously published corpus.

pub mod builder;
pub mod caption;
pub mod error;
pub mod index;
pub mod merge;
pub mod persist;
pub mod tokenizer;
pub mod vtt;

pub use builder::{build_corpus, CorpusBuilder};
pub use caption::{parse_caption_file, parse_document, CaptionSource};
pub use error::{Error, Result};
pub use index::{
    Corpus, FullTranscript, LocalWordMap, Segment, SegmentIndex, UploadDate, VideoDocument, VideoId, VideoMeta,
    WordMap,
};
pub use merge::{merge, MergeReport};
