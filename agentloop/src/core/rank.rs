//! Nearest-neighbour ranking over embedding rows.
//!
//! Two implementations share one contract: [`BruteForce`] scans the dense
//! matrix, [`PostingsIndex`] accumulates scores through per-bucket posting
//! lists. Both add the same non-zero products in ascending bucket order, so
//! they produce bit-identical scores and therefore identical rankings.

use std::cmp::Ordering;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::embed::dot;

/// Ranking capability over a fixed set of rows.
pub trait NeighborSearch {
    /// Row indices of the best `top_k` matches for `query`, most similar first.
    ///
    /// Ties are broken by ascending row index.
    fn search(&self, query: &[f32], top_k: usize) -> Vec<usize>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

impl<T: NeighborSearch + ?Sized> NeighborSearch for &T {
    fn search(&self, query: &[f32], top_k: usize) -> Vec<usize> {
        (**self).search(query, top_k)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Dense scan over a row-major matrix.
pub struct BruteForce<'a> {
    vectors: &'a [f32],
    dim: usize,
}

impl<'a> BruteForce<'a> {
    pub fn new(vectors: &'a [f32], dim: usize) -> Self {
        Self { vectors, dim }
    }
}

impl NeighborSearch for BruteForce<'_> {
    fn search(&self, query: &[f32], top_k: usize) -> Vec<usize> {
        if self.dim == 0 {
            return Vec::new();
        }
        let scored = self
            .vectors
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(row, vector)| (row, dot(vector, query)))
            .collect();
        top_rows(scored, top_k)
    }

    fn name(&self) -> &'static str {
        "brute_force"
    }
}

/// Persisted bucket → rows lists. Weights are not stored; they are joined
/// from the matrix at load time so the matrix stays the single source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingLists {
    pub rows: usize,
    pub dim: usize,
    /// Fingerprint of the matrix these lists were built from.
    pub fingerprint: String,
    /// For each bucket, rows with a non-zero weight, ascending.
    pub buckets: Vec<Vec<u32>>,
}

impl PostingLists {
    pub fn build(vectors: &[f32], dim: usize, fingerprint: String) -> Self {
        let mut buckets = vec![Vec::new(); dim];
        let mut rows = 0;
        if dim > 0 {
            for (row, vector) in vectors.chunks_exact(dim).enumerate() {
                rows += 1;
                for (bucket, weight) in vector.iter().enumerate() {
                    if *weight != 0.0 {
                        buckets[bucket].push(row as u32);
                    }
                }
            }
        }
        Self {
            rows,
            dim,
            fingerprint,
            buckets,
        }
    }
}

/// Sparse accumulator built from [`PostingLists`] joined with the matrix.
#[derive(Debug, Clone)]
pub struct PostingsIndex {
    rows: usize,
    buckets: Vec<Vec<(u32, f32)>>,
}

impl PostingsIndex {
    /// Join posting lists with the matrix they claim to describe.
    ///
    /// Fails if the lists were built from a different matrix.
    pub fn attach(
        lists: &PostingLists,
        vectors: &[f32],
        dim: usize,
        fingerprint: &str,
    ) -> Result<Self> {
        if lists.dim != dim || lists.buckets.len() != dim {
            bail!(
                "posting lists dimension {} != matrix dimension {dim}",
                lists.dim
            );
        }
        let rows = if dim == 0 { 0 } else { vectors.len() / dim };
        if lists.rows != rows {
            bail!("posting lists cover {} rows, matrix has {rows}", lists.rows);
        }
        if lists.fingerprint != fingerprint {
            bail!("posting lists fingerprint does not match matrix");
        }

        let mut buckets = Vec::with_capacity(dim);
        let mut posted = 0usize;
        for (bucket, list) in lists.buckets.iter().enumerate() {
            let mut joined = Vec::with_capacity(list.len());
            for &row in list {
                let index = row as usize;
                if index >= rows {
                    bail!("posting row {row} out of range");
                }
                let weight = vectors[index * dim + bucket];
                if weight == 0.0 {
                    bail!("posting row {row} has no weight in bucket {bucket}");
                }
                joined.push((row, weight));
            }
            posted += joined.len();
            buckets.push(joined);
        }

        let non_zero = vectors.iter().filter(|v| **v != 0.0).count();
        if posted != non_zero {
            bail!(
                "posting lists cover {posted} weights, matrix has {non_zero}"
            );
        }

        Ok(Self { rows, buckets })
    }
}

impl NeighborSearch for PostingsIndex {
    fn search(&self, query: &[f32], top_k: usize) -> Vec<usize> {
        let mut scores = vec![0.0f32; self.rows];
        for (bucket, q) in query.iter().enumerate() {
            if *q == 0.0 {
                continue;
            }
            let Some(list) = self.buckets.get(bucket) else {
                continue;
            };
            for &(row, weight) in list {
                scores[row as usize] += weight * q;
            }
        }
        top_rows(scores.into_iter().enumerate().collect(), top_k)
    }

    fn name(&self) -> &'static str {
        "postings"
    }
}

fn top_rows(mut scored: Vec<(usize, f32)>, top_k: usize) -> Vec<usize> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(top_k);
    scored.into_iter().map(|(row, _)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embed::{EMBEDDING_DIM, embed_text};

    fn matrix(texts: &[&str]) -> Vec<f32> {
        texts.iter().flat_map(|text| embed_text(text)).collect()
    }

    #[test]
    fn brute_force_orders_by_similarity() {
        let vectors = matrix(&["apples and pears", "rust borrow checker", "pears"]);
        let ranker = BruteForce::new(&vectors, EMBEDDING_DIM);
        let rows = ranker.search(&embed_text("pears"), 3);
        assert_eq!(rows[0], 2);
        assert_eq!(rows[1], 0);
        assert_eq!(rows[2], 1);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let vectors = matrix(&["same text", "unrelated words", "same text"]);
        let ranker = BruteForce::new(&vectors, EMBEDDING_DIM);
        let rows = ranker.search(&embed_text("same text"), 2);
        assert_eq!(rows, vec![0, 2]);
    }

    #[test]
    fn postings_agree_with_brute_force() {
        let vectors = matrix(&[
            "compute the factorial of 15",
            "list the first 12 fibonacci numbers",
            "search the web for apartment prices",
            "",
            "factorial of 20 please",
        ]);
        let lists = PostingLists::build(&vectors, EMBEDDING_DIM, "fp".to_string());
        let postings =
            PostingsIndex::attach(&lists, &vectors, EMBEDDING_DIM, "fp").expect("attach");
        let brute = BruteForce::new(&vectors, EMBEDDING_DIM);

        for query in ["factorial", "the first numbers", "nothing matches here", ""] {
            let q = embed_text(query);
            assert_eq!(
                postings.search(&q, 5),
                brute.search(&q, 5),
                "query {query:?}"
            );
            assert_eq!(
                postings.search(&q, 2),
                brute.search(&q, 2),
                "query {query:?}"
            );
        }
    }

    #[test]
    fn attach_rejects_foreign_matrix() {
        let vectors = matrix(&["one", "two"]);
        let lists = PostingLists::build(&vectors, EMBEDDING_DIM, "fp".to_string());
        let other = matrix(&["three", "four", "five"]);
        assert!(PostingsIndex::attach(&lists, &other, EMBEDDING_DIM, "fp").is_err());
        assert!(PostingsIndex::attach(&lists, &vectors, EMBEDDING_DIM, "other").is_err());
    }

    #[test]
    fn top_k_zero_is_empty() {
        let vectors = matrix(&["one"]);
        let ranker = BruteForce::new(&vectors, EMBEDDING_DIM);
        assert!(ranker.search(&embed_text("one"), 0).is_empty());
    }
}
