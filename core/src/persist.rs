use crate::error::{Error, Result};
use crate::index::{Corpus, FullTranscript, Segment, UploadDate, VideoDocument, VideoId, VideoMeta, WordMap};
use crate::merge::MergeReport;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Summary written next to every published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub videos: usize,
    pub words: usize,
    pub added: usize,
    pub updated: usize,
    pub stale_entries: usize,
    pub updated_at: String,
    pub version: u32,
}

impl RunSummary {
    pub fn new(corpus: &Corpus, report: &MergeReport) -> Self {
        Self {
            videos: corpus.num_videos(),
            words: corpus.word_map.len(),
            added: report.added(),
            updated: report.updated(),
            stale_entries: report.stale_entries,
            updated_at: corpus.updated_at.clone(),
            version: 1,
        }
    }
}

#[derive(Serialize)]
struct FinalFileRef<'a> {
    segments: &'a BTreeMap<VideoId, Vec<Segment>>,
    word_map: &'a WordMap,
    meta: &'a BTreeMap<VideoId, VideoMeta>,
    #[serde(rename = "updatedAt")]
    updated_at: &'a str,
}

#[derive(Deserialize)]
struct FinalFile {
    segments: BTreeMap<VideoId, Vec<Segment>>,
    word_map: WordMap,
    meta: BTreeMap<VideoId, VideoMeta>,
    #[serde(rename = "updatedAt")]
    updated_at: String,
}

/// Layout of a snapshot directory: the compact corpus in `final.json`, the
/// full-text view in `full.json`, and the run summary in `summary.json`.
///
/// The directory is owned by the indexer. Publishing replaces it whole: the
/// new snapshot is written to a hidden `.{name}.staging` sibling and swapped
/// in, with the old one parked at `.{name}.previous` until the swap is done.
pub struct CorpusPaths {
    pub root: PathBuf,
}

impl CorpusPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn final_json(&self) -> PathBuf { self.root.join("final.json") }
    pub fn full_json(&self) -> PathBuf { self.root.join("full.json") }
    pub fn summary(&self) -> PathBuf { self.root.join("summary.json") }
    pub fn staging(&self) -> Result<PathBuf> { self.sibling("staging") }
    pub fn previous(&self) -> Result<PathBuf> { self.sibling("previous") }

    fn sibling(&self, suffix: &str) -> Result<PathBuf> {
        let name = self
            .root
            .file_name()
            .ok_or_else(|| Error::corpus(self.root.display().to_string(), "snapshot directory needs a name"))?;
        Ok(self.root.with_file_name(format!(".{}.{suffix}", name.to_string_lossy())))
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

/// Write to a sibling temp file, then rename over the target so readers
/// never observe a half-written file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    write_synced(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Publish `corpus` without a run summary.
pub fn save_corpus(paths: &CorpusPaths, corpus: &Corpus) -> Result<()> {
    save_snapshot(paths, corpus, None)
}

/// Publish a complete snapshot. Every file is written into the staging
/// directory first; the published directory is only touched once all of them
/// are on disk, so a failed write leaves the previous snapshot as it was.
pub fn save_snapshot(paths: &CorpusPaths, corpus: &Corpus, summary: Option<&RunSummary>) -> Result<()> {
    let full = serde_json::to_vec(&corpus.full)?;
    let compact = serde_json::to_vec(&FinalFileRef {
        segments: &corpus.segments,
        word_map: &corpus.word_map,
        meta: &corpus.meta,
        updated_at: &corpus.updated_at,
    })?;
    let summary = summary.map(serde_json::to_string_pretty).transpose()?;

    let staging = CorpusPaths::new(paths.staging()?);
    let previous = paths.previous()?;
    if staging.root.is_dir() {
        fs::remove_dir_all(&staging.root)?;
    }
    create_dir_all(&staging.root)?;
    write_synced(&staging.full_json(), &full)?;
    write_synced(&staging.final_json(), &compact)?;
    if let Some(summary) = &summary {
        write_synced(&staging.summary(), summary.as_bytes())?;
    }

    // With no published directory, a parked snapshot is the live one and
    // stays until the new one is in place.
    if paths.root.exists() {
        if previous.exists() {
            fs::remove_dir_all(&previous)?;
        }
        fs::rename(&paths.root, &previous)?;
    }
    if let Err(e) = fs::rename(&staging.root, &paths.root) {
        if previous.exists() {
            if let Err(restore) = fs::rename(&previous, &paths.root) {
                tracing::error!(error = %restore, "could not restore previous snapshot");
            }
        }
        return Err(e.into());
    }
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }

    tracing::info!(root = %paths.root.display(), videos = corpus.num_videos(), "saved corpus");
    Ok(())
}

/// Load a published snapshot. `Ok(None)` when neither file exists; a
/// snapshot with only one of the two files, or with missing keys, is an error.
///
/// If a swap was interrupted after the old snapshot was parked but before
/// the new one landed, the parked snapshot is read instead.
pub fn load_corpus(paths: &CorpusPaths) -> Result<Option<Corpus>> {
    if !paths.root.exists() {
        let previous = paths.previous()?;
        if previous.is_dir() {
            tracing::warn!(root = %paths.root.display(), "reading snapshot left by an interrupted publish");
            return read_snapshot(&CorpusPaths::new(previous));
        }
    }
    read_snapshot(paths)
}

fn read_snapshot(paths: &CorpusPaths) -> Result<Option<Corpus>> {
    let (final_path, full_path) = (paths.final_json(), paths.full_json());
    match (final_path.exists(), full_path.exists()) {
        (false, false) => return Ok(None),
        (true, false) => return Err(Error::corpus(paths.root.display().to_string(), "full.json is missing")),
        (false, true) => return Err(Error::corpus(paths.root.display().to_string(), "final.json is missing")),
        (true, true) => {}
    }

    let raw = fs::read_to_string(&final_path)?;
    let compact: FinalFile = serde_json::from_str(&raw)
        .map_err(|e| Error::corpus(final_path.display().to_string(), e.to_string()))?;
    let raw = fs::read_to_string(&full_path)?;
    let full: BTreeMap<VideoId, FullTranscript> = serde_json::from_str(&raw)
        .map_err(|e| Error::corpus(full_path.display().to_string(), e.to_string()))?;

    Ok(Some(Corpus {
        segments: compact.segments,
        word_map: compact.word_map,
        meta: compact.meta,
        full,
        updated_at: compact.updated_at,
    }))
}

pub fn load_summary(paths: &CorpusPaths) -> Result<RunSummary> {
    let raw = fs::read_to_string(paths.summary())?;
    Ok(serde_json::from_str(&raw)?)
}

/// Cache one parsed document as `{dir}/{video_id}.bin`.
pub fn save_document(dir: &Path, doc: &VideoDocument) -> Result<()> {
    create_dir_all(dir)?;
    let bytes = bincode::serialize(doc)?;
    write_atomic(&dir.join(format!("{}.bin", doc.video_id)), &bytes)
}

/// Remove every cached document from `dir`. Other files are left alone.
pub fn clear_documents(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("bin") {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Every cached document in `dir`, in file-name order.
pub fn load_documents(dir: &Path) -> Result<Vec<VideoDocument>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("bin"))
        .collect();
    files.sort();

    let mut docs = Vec::with_capacity(files.len());
    for file in files {
        let bytes = fs::read(&file)?;
        docs.push(bincode::deserialize(&bytes)?);
    }
    Ok(docs)
}

/// Read the upload date table: one `video_id:date` pair per line, the date as
/// `YYYYMMDD` or `YYYY-MM-DD`. Blank lines are ignored.
pub fn load_upload_dates(path: &Path) -> Result<HashMap<VideoId, UploadDate>> {
    let raw = fs::read_to_string(path)?;
    parse_upload_dates(&raw)
}

pub fn parse_upload_dates(raw: &str) -> Result<HashMap<VideoId, UploadDate>> {
    let mut dates = HashMap::new();
    for (n, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() { continue; }
        let (vid, date) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedDates { line: n + 1, reason: "expected video_id:date".into() })?;
        let date = UploadDate::parse(date).map_err(|reason| Error::MalformedDates { line: n + 1, reason })?;
        dates.insert(vid.trim().to_string(), date);
    }
    Ok(dates)
}
