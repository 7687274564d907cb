//! Folding a freshly built corpus into the published one.
//!
//! Incoming data wins per video id, and a video is always taken whole from
//! one side: its segments, metadata, full text and index entries never mix
//! existing and incoming fields. After the overlay, index entries that no
//! longer point at a live segment are dropped.

use serde::Serialize;

use crate::error::Result;
use crate::index::Corpus;

/// Video counts for one merge, for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub existing: usize,
    pub incoming: usize,
    pub existing_only: usize,
    pub incoming_only: usize,
    /// Videos present on both sides; the incoming copy replaced the existing one.
    pub overlap: usize,
    pub merged: usize,
    /// `(word, video)` entries removed or trimmed during cleanup.
    pub stale_entries: usize,
}

impl MergeReport {
    pub fn added(&self) -> usize { self.incoming_only }

    pub fn updated(&self) -> usize { self.overlap }
}

/// Merge `incoming` over `existing`. With no published corpus the result is
/// `incoming` unchanged.
///
/// Both inputs are left untouched and a new corpus is returned; the merged
/// result is validated before it is handed back, so a corpus that would break
/// index soundness is never returned.
pub fn merge(existing: Option<&Corpus>, incoming: &Corpus) -> Result<(Corpus, MergeReport)> {
    incoming.validate("incoming")?;

    let Some(existing) = existing else {
        let n = incoming.num_videos();
        tracing::info!(videos = n, "no published corpus, first publish");
        let report = MergeReport { incoming: n, incoming_only: n, merged: n, ..MergeReport::default() };
        return Ok((incoming.clone(), report));
    };
    existing.check_keys("existing")?;

    // Per-video overlay. Incoming wins.
    let mut segments = existing.segments.clone();
    segments.extend(incoming.segments.iter().map(|(k, v)| (k.clone(), v.clone())));
    let mut meta = existing.meta.clone();
    meta.extend(incoming.meta.iter().map(|(k, v)| (k.clone(), v.clone())));
    let mut full = existing.full.clone();
    full.extend(incoming.full.iter().map(|(k, v)| (k.clone(), v.clone())));

    // Index sets are replaced per (word, video), never unioned.
    let mut word_map = existing.word_map.clone();
    for (word, videos) in &incoming.word_map {
        let entry = word_map.entry(word.clone()).or_default();
        for (vid, idxs) in videos {
            entry.insert(vid.clone(), idxs.clone());
        }
    }

    let mut stale = 0usize;
    word_map.retain(|word, videos| {
        videos.retain(|vid, idxs| {
            let Some(segs) = segments.get(vid) else {
                tracing::debug!(word = %word, video_id = %vid, "dropping entry for removed video");
                stale += 1;
                return false;
            };
            // A re-parsed video owns exactly the entries its new document produced.
            if incoming.segments.contains_key(vid)
                && !incoming.word_map.get(word).is_some_and(|m| m.contains_key(vid))
            {
                tracing::debug!(word = %word, video_id = %vid, "dropping entry superseded by re-parse");
                stale += 1;
                return false;
            }
            let before = idxs.len();
            idxs.retain(|&i| (i as usize) < segs.len());
            if idxs.len() != before {
                tracing::debug!(word = %word, video_id = %vid, "trimming out-of-range segment indexes");
                stale += 1;
            }
            !idxs.is_empty()
        });
        !videos.is_empty()
    });

    let overlap = existing.segments.keys().filter(|k| incoming.segments.contains_key(*k)).count();
    let report = MergeReport {
        existing: existing.num_videos(),
        incoming: incoming.num_videos(),
        existing_only: existing.num_videos() - overlap,
        incoming_only: incoming.num_videos() - overlap,
        overlap,
        merged: segments.len(),
        stale_entries: stale,
    };

    let merged = Corpus { segments, word_map, meta, full, updated_at: incoming.updated_at.clone() };
    merged.validate("merged")?;

    if stale > 0 {
        tracing::info!(stale_entries = stale, "removed stale index entries");
    }
    tracing::info!(
        existing = report.existing,
        new = report.incoming,
        overlap = report.overlap,
        merged = report.merged,
        "merged corpus"
    );
    Ok((merged, report))
}
