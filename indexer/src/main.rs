use anyhow::{bail, Context, Result};
use caption_core::persist::{
    clear_documents, load_corpus, load_documents, load_upload_dates, save_corpus, save_document, save_snapshot, CorpusPaths,
    RunSummary,
};
use caption_core::{build_corpus, merge, parse_caption_file, Corpus, MergeReport, UploadDate, VideoDocument, VideoId};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and merge the transcript search corpus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse caption files into a cache of parsed documents
    Parse {
        /// Caption file or directory of `.vtt` files
        #[arg(long)]
        captions: String,
        /// Upload date table (`video_id:date` per line)
        #[arg(long)]
        dates: String,
        /// Output directory for parsed documents
        #[arg(long)]
        output: String,
        /// Parser worker threads (defaults to the number of CPUs)
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Build a corpus snapshot from parsed documents
    Build {
        /// Directory written by `parse`
        #[arg(long)]
        parsed: String,
        /// Output snapshot directory
        #[arg(long)]
        output: String,
    },
    /// Merge a new snapshot over the published one
    Merge {
        /// Published snapshot directory; may be absent on first publish
        #[arg(long)]
        existing: String,
        /// Snapshot produced by `build`
        #[arg(long)]
        incoming: String,
        /// Output snapshot directory
        #[arg(long)]
        output: String,
    },
    /// Parse, build and merge in one pass
    Run {
        #[arg(long)]
        captions: String,
        #[arg(long)]
        dates: String,
        /// Published snapshot directory (defaults to --output)
        #[arg(long)]
        existing: Option<String>,
        #[arg(long)]
        output: String,
        #[arg(long)]
        jobs: Option<usize>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { captions, dates, output, jobs } => {
            let count = parse_to_cache(Path::new(&captions), Path::new(&dates), Path::new(&output), jobs)?;
            tracing::info!(documents = count, output, "parse complete");
            Ok(())
        }
        Commands::Build { parsed, output } => {
            let docs = load_documents(Path::new(&parsed)).with_context(|| format!("reading parsed documents from {parsed}"))?;
            let corpus = build_corpus(docs, now_rfc3339()?)?;
            save_corpus(&CorpusPaths::new(&output), &corpus)?;
            tracing::info!(output, "build complete");
            Ok(())
        }
        Commands::Merge { existing, incoming, output } => {
            let incoming_corpus = load_corpus(&CorpusPaths::new(&incoming))?
                .with_context(|| format!("no snapshot found in {incoming}"))?;
            let existing_corpus = load_corpus(&CorpusPaths::new(&existing))?;
            publish(existing_corpus.as_ref(), &incoming_corpus, &CorpusPaths::new(&output))?;
            Ok(())
        }
        Commands::Run { captions, dates, existing, output, jobs } => {
            run_pipeline(Path::new(&captions), Path::new(&dates), existing.as_deref().map(Path::new), Path::new(&output), jobs)?;
            Ok(())
        }
    }
}

fn now_rfc3339() -> Result<String> {
    Ok(time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339)?)
}

/// Every `.vtt` file under `input`, sorted so runs are reproducible.
fn discover_captions(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("vtt") {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("caption input {} does not exist", input.display());
    }
    files.sort();
    Ok(files)
}

/// Parse every caption file on a bounded pool. The first failure aborts the
/// whole batch; no document is returned unless all parsed.
fn parse_captions(captions: &Path, dates: &Path, jobs: Option<usize>) -> Result<Vec<VideoDocument>> {
    let dates: HashMap<VideoId, UploadDate> =
        load_upload_dates(dates).with_context(|| format!("reading upload dates from {}", dates.display()))?;
    let files = discover_captions(captions)?;
    tracing::info!(files = files.len(), "parsing caption files");

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(n) = jobs {
        pool = pool.num_threads(n);
    }
    let pool = pool.build()?;
    pool.install(|| {
        files
            .par_iter()
            .map(|f| parse_caption_file(f, &dates).with_context(|| format!("parsing {}", f.display())))
            .collect()
    })
}

/// Parse into `output`, replacing whatever an earlier `parse` left there, so a
/// later `build` sees exactly this batch. The cache is only touched once every
/// file parsed.
fn parse_to_cache(captions: &Path, dates: &Path, output: &Path, jobs: Option<usize>) -> Result<usize> {
    let docs = parse_captions(captions, dates, jobs)?;
    let removed = clear_documents(output)?;
    if removed > 0 {
        tracing::debug!(removed, "cleared previous parse output");
    }
    for doc in &docs {
        save_document(output, doc)?;
    }
    Ok(docs.len())
}

/// Merge `incoming` over `existing` and write the result to `out`.
fn publish(existing: Option<&Corpus>, incoming: &Corpus, out: &CorpusPaths) -> Result<(Corpus, MergeReport)> {
    let (merged, report) = merge(existing, incoming)?;
    let summary = RunSummary::new(&merged, &report);
    save_snapshot(out, &merged, Some(&summary))?;
    tracing::info!(
        added = summary.added,
        updated = summary.updated,
        total = summary.videos,
        stale_entries = summary.stale_entries,
        "published corpus"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok((merged, report))
}

fn run_pipeline(
    captions: &Path,
    dates: &Path,
    existing: Option<&Path>,
    output: &Path,
    jobs: Option<usize>,
) -> Result<(Corpus, MergeReport)> {
    let docs = parse_captions(captions, dates, jobs)?;
    let incoming = build_corpus(docs, now_rfc3339()?)?;
    let existing_paths = CorpusPaths::new(existing.unwrap_or(output));
    let existing_corpus = load_corpus(&existing_paths)?;
    publish(existing_corpus.as_ref(), &incoming, &CorpusPaths::new(output))
}
