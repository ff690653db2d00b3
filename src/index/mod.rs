// Exact nearest-neighbour index over embedding vectors
// Vectors live in one flat buffer; search is an exhaustive squared-L2 scan


use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::write_atomically;

/// Bumped whenever the persisted layout changes; older files are rebuilt
const INDEX_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Index dimension must be greater than zero")]
    ZeroDimension,
    #[error("Failed to encode index: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Failed to write index to {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Flat (brute-force) index: every search compares the query against every
/// stored vector, so recall is exact.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
    fingerprint: Option<String>,
    embedding_model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    fingerprint: Option<String>,
    embedding_model: Option<String>,
    dimension: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }

        Ok(Self {
            dimension,
            vectors: Vec::new(),
            fingerprint: None,
            embedding_model: None,
        })
    }

    /// Build an index from `vectors`, taking the dimension from the first one.
    /// Returns `Ok(None)` for an empty input.
    #[inline]
    pub fn build(vectors: &[Vec<f32>]) -> Result<Option<Self>, IndexError> {
        let Some(first) = vectors.first() else {
            return Ok(None);
        };

        let mut index = Self::new(first.len())?;
        index.add(vectors)?;
        Ok(Some(index))
    }

    /// Tag the index with the fingerprint of the corpus it was built from
    #[inline]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    #[inline]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Tag the index with the model that produced its vectors
    #[inline]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    #[inline]
    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    #[inline]
    pub fn size(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append vectors in order; position `i` of the index is the `i`-th vector
    /// ever added. Nothing is added if any vector has the wrong dimension.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        self.vectors.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }

        debug!(
            "Added {} vectors to index (size now {})",
            vectors.len(),
            self.size()
        );
        Ok(())
    }

    /// Vector stored at `position`
    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.vectors
            .chunks_exact(self.dimension)
            .nth(position)
    }

    /// The `k` nearest vectors to `query` as parallel `(distances, positions)`,
    /// nearest first. Distances are squared Euclidean; equal distances are
    /// ordered by position. Asking for more than `size()` returns everything.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<usize>), IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|stored| squared_l2(query, stored))
            .enumerate()
            .map(|(position, distance)| (distance, position))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored.into_iter().unzip())
    }

    /// Write the index to `path`, replacing any previous file atomically
    #[inline]
    pub fn persist(&self, path: &Path) -> Result<(), IndexError> {
        let persisted = PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            fingerprint: self.fingerprint.clone(),
            embedding_model: self.embedding_model.clone(),
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        let bytes = rmp_serde::to_vec_named(&persisted)?;

        write_atomically(path, &bytes).map_err(|source| IndexError::Write {
            path: path.display().to_string(),
            source,
        })?;

        info!(
            "Persisted index with {} vectors ({} dimensions) to {}",
            self.size(),
            self.dimension,
            path.display()
        );
        Ok(())
    }

    /// Read an index written by [`FlatIndex::persist`].
    ///
    /// A missing file is `None`. So is a file that cannot be decoded or was
    /// written by another format version: the caller rebuilds in both cases.
    #[inline]
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No persisted index at {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read index {}: {}", path.display(), e);
                return None;
            }
        };

        let persisted: PersistedIndex = match rmp_serde::from_slice(&bytes) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!("Discarding unreadable index {}: {}", path.display(), e);
                return None;
            }
        };

        if persisted.version != INDEX_FORMAT_VERSION {
            warn!(
                "Discarding index {} with format version {} (expected {})",
                path.display(),
                persisted.version,
                INDEX_FORMAT_VERSION
            );
            return None;
        }

        if persisted.dimension == 0 || persisted.vectors.len() % persisted.dimension != 0 {
            warn!(
                "Discarding index {}: {} values do not divide into dimension {}",
                path.display(),
                persisted.vectors.len(),
                persisted.dimension
            );
            return None;
        }

        let index = Self {
            dimension: persisted.dimension,
            vectors: persisted.vectors,
            fingerprint: persisted.fingerprint,
            embedding_model: persisted.embedding_model,
        };
        debug!(
            "Loaded index with {} vectors from {}",
            index.size(),
            path.display()
        );
        Some(index)
    }
}

#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
