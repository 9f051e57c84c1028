//! Offline build of the history embedding index from session transcripts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::embed::{EMBEDDING_DIM, embed_text, history_text};
use crate::core::rank::PostingLists;
use crate::core::types::HistoryRecord;
use crate::io::snapshot::{Snapshot, remove_postings, write_postings, write_snapshot};
use crate::io::transcript::{extract_pair, read_records};

/// Summary of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub index_dir: PathBuf,
    pub transcripts_scanned: usize,
    pub transcripts_skipped: usize,
    pub pairs: usize,
    pub postings_written: bool,
}

pub struct EmbeddingIndexBuilder {
    memory_dir: PathBuf,
    index_dir: PathBuf,
    accelerate: bool,
}

impl EmbeddingIndexBuilder {
    pub fn new(memory_dir: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            memory_dir: memory_dir.into(),
            index_dir: index_dir.into(),
            accelerate: true,
        }
    }

    /// Whether to also persist posting lists.
    pub fn accelerate(mut self, enabled: bool) -> Self {
        self.accelerate = enabled;
        self
    }

    /// Scan transcripts, embed every pair, and replace the snapshot.
    ///
    /// Zero pairs still produce an explicit empty snapshot.
    #[instrument(
        skip_all,
        fields(memory_dir = %self.memory_dir.display(), index_dir = %self.index_dir.display())
    )]
    pub fn build(&self) -> Result<BuildReport> {
        let (pairs, scanned, skipped) = collect_pairs(&self.memory_dir);

        let mut vectors = Vec::with_capacity(pairs.len() * EMBEDDING_DIM);
        let mut metadata = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            vectors.extend(embed_text(&history_text(&pair.query, &pair.answer)));
            metadata.push(serde_json::to_string(pair).context("serialize history record")?);
        }
        let snapshot = Snapshot {
            dim: EMBEDDING_DIM,
            vectors,
            metadata,
        };
        write_snapshot(&self.index_dir, &snapshot)
            .with_context(|| format!("write snapshot to {}", self.index_dir.display()))?;

        let postings_written = self.accelerate && !snapshot.is_empty();
        if postings_written {
            let lists =
                PostingLists::build(&snapshot.vectors, snapshot.dim, snapshot.fingerprint());
            write_postings(&self.index_dir, &lists)?;
        } else {
            remove_postings(&self.index_dir)?;
        }

        info!(
            pairs = pairs.len(),
            scanned, skipped, postings_written, "history index built"
        );
        Ok(BuildReport {
            index_dir: self.index_dir.clone(),
            transcripts_scanned: scanned,
            transcripts_skipped: skipped,
            pairs: pairs.len(),
            postings_written,
        })
    }
}

/// Walk `memory_dir` in path order and extract one pair per usable transcript.
///
/// Returns `(pairs, scanned, skipped)`. A missing directory yields nothing.
fn collect_pairs(memory_dir: &Path) -> (Vec<HistoryRecord>, usize, usize) {
    let mut pairs = Vec::new();
    let mut scanned = 0;
    let mut skipped = 0;
    if !memory_dir.exists() {
        debug!(path = %memory_dir.display(), "memory directory missing");
        return (pairs, scanned, skipped);
    }

    for entry in WalkDir::new(memory_dir).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable memory entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        scanned += 1;
        match read_records(path) {
            Ok(records) => match extract_pair(&records) {
                Some(pair) => pairs.push(pair),
                None => debug!(path = %path.display(), "transcript has no query/answer pair"),
            },
            Err(err) => {
                skipped += 1;
                debug!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "skipping malformed transcript"
                );
            }
        }
    }
    (pairs, scanned, skipped)
}
