// Persisted chunk manifest and the corpus fingerprint that validates it


use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::storage::write_atomically;

/// Chunk texts and their source paths, position-aligned with the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub all_chunks: Vec<String>,
    pub chunk_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl ChunkManifest {
    #[inline]
    pub fn new(all_chunks: Vec<String>, chunk_sources: Vec<String>) -> Self {
        let fingerprint = corpus_fingerprint(&all_chunks, &chunk_sources);
        Self {
            all_chunks,
            chunk_sources,
            fingerprint: Some(fingerprint),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.all_chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.all_chunks.is_empty()
    }

    /// Stored fingerprint, or one computed from the contents for manifests
    /// written without it
    #[inline]
    pub fn effective_fingerprint(&self) -> String {
        self.fingerprint
            .clone()
            .unwrap_or_else(|| corpus_fingerprint(&self.all_chunks, &self.chunk_sources))
    }

    /// Whether this manifest describes the corpus identified by `fingerprint`
    #[inline]
    pub fn describes(&self, chunk_count: usize, fingerprint: &str) -> bool {
        self.all_chunks.len() == chunk_count
            && self.chunk_sources.len() == chunk_count
            && self.effective_fingerprint() == fingerprint
    }

    /// Read a manifest; missing, unreadable and malformed files are all `None`.
    #[inline]
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No chunk manifest at {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read chunk manifest {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<Self>(&bytes) {
            Ok(manifest) if manifest.all_chunks.len() == manifest.chunk_sources.len() => {
                Some(manifest)
            }
            Ok(manifest) => {
                warn!(
                    "Discarding chunk manifest {}: {} chunks but {} sources",
                    path.display(),
                    manifest.all_chunks.len(),
                    manifest.chunk_sources.len()
                );
                None
            }
            Err(e) => {
                warn!("Discarding unreadable chunk manifest {}: {}", path.display(), e);
                None
            }
        }
    }

    #[inline]
    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(self).context("Failed to encode chunk manifest")?;
        write_atomically(path, &bytes)
            .with_context(|| format!("Failed to write chunk manifest to {}", path.display()))?;

        debug!(
            "Persisted chunk manifest with {} chunks to {}",
            self.len(),
            path.display()
        );
        Ok(())
    }
}

/// SHA-256 over every chunk and its source, in order.
///
/// Chunking parameters are covered through the chunks they produce.
/// Each field is length-prefixed so that moving text between adjacent chunks
/// or between a chunk and its source changes the digest.
#[inline]
pub fn corpus_fingerprint(chunks: &[String], sources: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((chunks.len() as u64).to_le_bytes());

    for (chunk, source) in chunks.iter().zip(sources) {
        for field in [source, chunk] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }

    hex::encode(hasher.finalize())
}
