//! Error types for caption parsing, corpus building and merging.

use thiserror::Error;

/// Every fatal condition the pipeline can hit. Any of these aborts the run
/// before a snapshot is written.
#[derive(Error, Debug)]
pub enum Error {
    /// A cue or caption file violates the expected caption structure.
    #[error("malformed caption in {file} (cue {cue}): {reason}")]
    MalformedCaption { file: String, cue: usize, reason: String },

    /// The caption file name carries no `[video id]` block.
    #[error("cannot derive a video id from file name: {0}")]
    UnrecognizedFileName(String),

    /// The upload date table has no entry for a video.
    #[error("no upload date for video {0}")]
    MissingUploadDate(String),

    /// Two documents of the same run claim one video id.
    #[error("duplicate video id {video_id}: {first} and {second}")]
    DuplicateVideo { video_id: String, first: String, second: String },

    /// A stored or in-memory corpus is missing required structure.
    #[error("malformed corpus ({origin}): {reason}")]
    MalformedCorpus { origin: String, reason: String },

    /// The upload date table has a line that cannot be read.
    #[error("malformed upload date table at line {line}: {reason}")]
    MalformedDates { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl Error {
    pub(crate) fn caption(file: &str, cue: usize, reason: impl Into<String>) -> Self {
        Error::MalformedCaption { file: file.to_string(), cue, reason: reason.into() }
    }

    pub(crate) fn corpus(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedCorpus { origin: origin.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
