//! On-disk history index snapshot.
//!
//! Layout inside the index directory:
//!
//! - `history_index.bin`: magic `AHIX`, u32 version, u32 rows, u32 dim, then
//!   `rows * dim` little-endian f32 values (row-major).
//! - `history_meta.json`: JSON array with one serialized record per row.
//! - `history_postings.json`: optional posting lists over the same matrix.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};

use crate::core::rank::PostingLists;
use crate::io::config::write_atomic;

pub const INDEX_FILE: &str = "history_index.bin";
pub const META_FILE: &str = "history_meta.json";
pub const POSTINGS_FILE: &str = "history_postings.json";

const MAGIC: &[u8; 4] = b"AHIX";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// Dense embedding matrix plus one metadata string per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub dim: usize,
    /// Row-major, `rows() * dim` values.
    pub vectors: Vec<f32>,
    pub metadata: Vec<String>,
}

impl Snapshot {
    pub fn empty(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.vectors)
    }
}

/// SHA-256 over the little-endian matrix bytes, hex encoded.
pub fn fingerprint(vectors: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for value in vectors {
        hasher.update(value.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<()> {
    if snapshot.vectors.len() != snapshot.rows() * snapshot.dim {
        bail!(
            "matrix holds {} values, expected {} rows x {} dims",
            snapshot.vectors.len(),
            snapshot.rows(),
            snapshot.dim
        );
    }
    let rows = u32::try_from(snapshot.rows()).context("row count exceeds u32")?;
    let dim = u32::try_from(snapshot.dim).context("dimension exceeds u32")?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + snapshot.vectors.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&rows.to_le_bytes());
    bytes.extend_from_slice(&dim.to_le_bytes());
    for value in &snapshot.vectors {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    let mut meta = serde_json::to_string_pretty(&snapshot.metadata).context("serialize metadata")?;
    meta.push('\n');

    write_atomic(&dir.join(INDEX_FILE), &bytes)?;
    write_atomic(&dir.join(META_FILE), meta.as_bytes())?;
    Ok(())
}

pub fn load_snapshot(dir: &Path) -> Result<Snapshot> {
    let index_path = dir.join(INDEX_FILE);
    let bytes = fs::read(&index_path).with_context(|| format!("read {}", index_path.display()))?;
    let (rows, dim, vectors) =
        decode_matrix(&bytes).with_context(|| format!("decode {}", index_path.display()))?;

    let meta_path = dir.join(META_FILE);
    let raw = fs::read_to_string(&meta_path)
        .with_context(|| format!("read {}", meta_path.display()))?;
    let metadata: Vec<String> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", meta_path.display()))?;
    if metadata.len() != rows {
        bail!(
            "metadata has {} entries, matrix has {rows} rows",
            metadata.len()
        );
    }

    Ok(Snapshot {
        dim,
        vectors,
        metadata,
    })
}

fn decode_matrix(bytes: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        bail!("not a history index file");
    }
    let version = read_u32(bytes, 4);
    if version != VERSION {
        bail!("unsupported index version {version}");
    }
    let rows = read_u32(bytes, 8) as usize;
    let dim = read_u32(bytes, 12) as usize;
    let expected = rows
        .checked_mul(dim)
        .and_then(|values| values.checked_mul(4))
        .and_then(|len| len.checked_add(HEADER_LEN))
        .context("index dimensions overflow")?;
    if bytes.len() != expected {
        bail!("index is {} bytes, header implies {expected}", bytes.len());
    }
    let vectors = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok((rows, dim, vectors))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub fn write_postings(dir: &Path, lists: &PostingLists) -> Result<()> {
    let payload = serde_json::to_vec(lists).context("serialize posting lists")?;
    write_atomic(&dir.join(POSTINGS_FILE), &payload)
}

/// Load posting lists. A missing file is `Ok(None)`.
pub fn load_postings(dir: &Path) -> Result<Option<PostingLists>> {
    let path = dir.join(POSTINGS_FILE);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    let lists = serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(lists))
}

/// Delete stale posting lists, if any.
pub fn remove_postings(dir: &Path) -> Result<()> {
    let path = dir.join(POSTINGS_FILE);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot {
            dim: 3,
            vectors: vec![1.0, 0.0, 0.0, 0.0, 0.6, 0.8],
            metadata: vec!["first".to_string(), "second".to_string()],
        }
    }

    #[test]
    fn snapshot_survives_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_snapshot(temp.path(), &sample()).expect("write");
        let loaded = load_snapshot(temp.path()).expect("load");
        assert_eq!(loaded, sample());
    }

    #[test]
    fn header_is_magic_then_counts() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_snapshot(temp.path(), &sample()).expect("write");
        let bytes = fs::read(temp.path().join(INDEX_FILE)).expect("read");
        assert_eq!(&bytes[..4], b"AHIX");
        assert_eq!(read_u32(&bytes, 8), 2);
        assert_eq!(read_u32(&bytes, 12), 3);
        assert_eq!(bytes.len(), 16 + 6 * 4);
    }

    #[test]
    fn empty_snapshot_is_explicit() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_snapshot(temp.path(), &Snapshot::empty(256)).expect("write");
        let loaded = load_snapshot(temp.path()).expect("load");
        assert!(loaded.is_empty());
        assert_eq!(loaded.dim, 256);
    }

    #[test]
    fn truncated_matrix_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_snapshot(temp.path(), &sample()).expect("write");
        let path = temp.path().join(INDEX_FILE);
        let bytes = fs::read(&path).expect("read");
        fs::write(&path, &bytes[..bytes.len() - 2]).expect("truncate");
        assert!(load_snapshot(temp.path()).is_err());
    }

    #[test]
    fn metadata_count_must_match_rows() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_snapshot(temp.path(), &sample()).expect("write");
        fs::write(temp.path().join(META_FILE), "[\"only one\"]").expect("write meta");
        let err = load_snapshot(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("metadata"));
    }

    #[test]
    fn missing_postings_is_none_and_removal_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(load_postings(temp.path()).expect("load").is_none());
        remove_postings(temp.path()).expect("remove missing");

        let snapshot = sample();
        let lists = PostingLists::build(&snapshot.vectors, snapshot.dim, snapshot.fingerprint());
        write_postings(temp.path(), &lists).expect("write");
        assert_eq!(load_postings(temp.path()).expect("load"), Some(lists));
        remove_postings(temp.path()).expect("remove");
        assert!(!temp.path().join(POSTINGS_FILE).exists());
    }

    #[test]
    fn fingerprint_tracks_matrix_contents() {
        let a = fingerprint(&[1.0, 0.0]);
        let b = fingerprint(&[0.0, 1.0]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint(&[1.0, 0.0]));
    }
}
