//! Deterministic hashed bag-of-words embeddings.
//!
//! The same function embeds history entries at build time and queries at
//! retrieval time, so it must stay bit-for-bit stable across runs and
//! platforms. Buckets come from SHA-256, never from `std` hashing.

use sha2::{Digest, Sha256};

/// Embedding width shared by the builder, the snapshot format and the retriever.
pub const EMBEDDING_DIM: usize = 256;

/// Map a token to its bucket.
pub fn bucket_for(token: &str) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(prefix) % EMBEDDING_DIM as u64) as usize
}

/// Embed `text` as an L2-normalized bucket-count vector.
///
/// Text with no tokens yields the zero vector.
pub fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];
    for token in text.to_lowercase().split_whitespace() {
        vector[bucket_for(token)] += 1.0;
    }

    let norm = l2_norm(&vector);
    if norm > 0.0 {
        for value in &mut vector {
            *value = (f64::from(*value) / norm) as f32;
        }
    }
    vector
}

/// Text embedded for a history entry.
pub fn history_text(query: &str, answer: &str) -> String {
    format!("{query}\n{answer}")
}

pub fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}

/// Inner product, accumulated in ascending dimension order.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        acc += x * y;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let a = embed_text("Compute the factorial of 15");
        let b = embed_text("Compute the factorial of 15");
        let bits_a: Vec<u32> = a.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u32> = b.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn embedding_has_unit_norm() {
        for text in ["one", "a b c d e f g", "repeat repeat repeat other"] {
            let norm = l2_norm(&embed_text(text));
            assert!((norm - 1.0).abs() <= 1e-6, "norm {norm} for {text:?}");
        }
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let vector = embed_text("   \n\t ");
        assert_eq!(vector.len(), EMBEDDING_DIM);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn tokens_are_case_insensitive() {
        assert_eq!(embed_text("Hello WORLD"), embed_text("hello world"));
    }

    #[test]
    fn identical_texts_have_unit_similarity() {
        let v = embed_text("list the first 12 fibonacci numbers");
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }
}
