//! Nearest-neighbour lookup over the history snapshot.

use std::path::Path;

use tracing::{debug, warn};

use crate::core::embed::{EMBEDDING_DIM, embed_text};
use crate::core::rank::{BruteForce, NeighborSearch, PostingsIndex};
use crate::core::types::HistoryRecord;
use crate::io::snapshot::{Snapshot, load_postings, load_snapshot};

/// Read-only view of one snapshot.
///
/// Loading never fails: a missing or corrupt snapshot behaves as an empty
/// corpus, and unusable posting lists fall back to a dense scan.
#[derive(Debug)]
pub struct HistoryRetriever {
    snapshot: Snapshot,
    postings: Option<PostingsIndex>,
}

impl HistoryRetriever {
    pub fn load(index_dir: &Path) -> Self {
        let snapshot = match load_snapshot(index_dir) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(
                    index_dir = %index_dir.display(),
                    error = %format!("{err:#}"),
                    "no usable history snapshot"
                );
                return Self::empty();
            }
        };
        if snapshot.dim != EMBEDDING_DIM {
            warn!(
                dim = snapshot.dim,
                "history snapshot has unexpected dimension"
            );
            return Self::empty();
        }
        let postings = attach_postings(index_dir, &snapshot);
        debug!(
            rows = snapshot.rows(),
            accelerated = postings.is_some(),
            "history snapshot loaded"
        );
        Self { snapshot, postings }
    }

    pub fn empty() -> Self {
        Self {
            snapshot: Snapshot::empty(EMBEDDING_DIM),
            postings: None,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn is_accelerated(&self) -> bool {
        self.postings.is_some()
    }

    /// The ranking implementation used for queries.
    pub fn ranker(&self) -> Box<dyn NeighborSearch + '_> {
        match &self.postings {
            Some(postings) => Box::new(postings),
            None => Box::new(BruteForce::new(&self.snapshot.vectors, self.snapshot.dim)),
        }
    }

    /// Up to `top_k` past records most similar to `query`, best first.
    ///
    /// Rows whose metadata does not deserialize are skipped, so fewer than
    /// `top_k` records may be returned.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<HistoryRecord> {
        if self.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let ranker = self.ranker();
        let rows = ranker.search(&embed_text(query), top_k);
        debug!(ranker = ranker.name(), hits = rows.len(), "history search");
        rows.into_iter()
            .filter_map(|row| {
                let raw = self.snapshot.metadata.get(row)?;
                match serde_json::from_str(raw) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        debug!(row, error = %err, "skipping unreadable history row");
                        None
                    }
                }
            })
            .collect()
    }
}

fn attach_postings(index_dir: &Path, snapshot: &Snapshot) -> Option<PostingsIndex> {
    let lists = match load_postings(index_dir) {
        Ok(Some(lists)) => lists,
        Ok(None) => return None,
        Err(err) => {
            debug!(error = %format!("{err:#}"), "ignoring unreadable posting lists");
            return None;
        }
    };
    match PostingsIndex::attach(
        &lists,
        &snapshot.vectors,
        snapshot.dim,
        &snapshot.fingerprint(),
    ) {
        Ok(index) => Some(index),
        Err(err) => {
            debug!(error = %format!("{err:#}"), "ignoring stale posting lists");
            None
        }
    }
}
