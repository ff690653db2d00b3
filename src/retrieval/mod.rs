// Retrieval engine
// Builds or reloads the searchable corpus once, then answers top-k queries

pub mod manifest;
pub mod slot;

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::embeddings::Embedder;
use crate::embeddings::chunking::ChunkingConfig;
use crate::extractor::{chunk_documents, load_documents};
use crate::index::FlatIndex;
use crate::{RagError, Result};

pub use manifest::{ChunkManifest, corpus_fingerprint};
pub use slot::{BuildGuard, EngineSlot};

/// Number of chunks returned when the caller does not ask for a specific count
pub const DEFAULT_TOP_K: usize = 3;

/// Where the corpus lives and how it is cut and embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub documents_dir: PathBuf,
    pub batch_size: usize,
    pub index_path: PathBuf,
    pub chunks_path: PathBuf,
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Building,
    Ready,
}

impl fmt::Display for EngineState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Building => "building",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// How the vector index was obtained during construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// A persisted index matched the corpus and was loaded as is
    Reused,
    /// Every chunk was embedded again and the index re-persisted
    Rebuilt,
    /// The corpus has no chunks, so there is nothing to index
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: Option<usize>,
    pub manifest_reused: bool,
    pub index: IndexOrigin,
    pub fingerprint: String,
}

/// One search hit, nearest first in a result list
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: String,
    pub source: String,
    /// Squared Euclidean distance between the query and chunk embeddings
    pub distance: f32,
}

/// A fully built corpus: chunk texts, their sources and the vectors that
/// index them, all position-aligned.
///
/// Immutable once constructed; share it behind an `Arc`.
pub struct RetrievalEngine {
    manifest: ChunkManifest,
    index: Option<FlatIndex>,
    embedder: Arc<dyn Embedder>,
    stats: BuildStats,
}

impl fmt::Debug for RetrievalEngine {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl RetrievalEngine {
    /// Chunk the documents folder, then reuse or rebuild the cached chunk
    /// manifest and vector index so both match the current corpus.
    ///
    /// Any embedding failure aborts construction; nothing half-built is
    /// returned.
    #[inline]
    pub fn construct(options: &EngineOptions, embedder: Arc<dyn Embedder>) -> Result<Self> {
        info!(
            "Building retrieval corpus from {}",
            options.documents_dir.display()
        );

        let documents = load_documents(&options.documents_dir);
        let (chunks, sources) = chunk_documents(&documents, &options.chunking);
        let fingerprint = corpus_fingerprint(&chunks, &sources);
        let chunk_count = chunks.len();

        let (manifest, manifest_reused) = match ChunkManifest::load(&options.chunks_path) {
            Some(cached) if cached.describes(chunk_count, &fingerprint) => {
                debug!("Reusing chunk manifest at {}", options.chunks_path.display());
                let upgrade = cached.fingerprint.is_none();
                let manifest = ChunkManifest {
                    fingerprint: Some(fingerprint.clone()),
                    ..cached
                };
                if upgrade {
                    manifest.persist(&options.chunks_path)?;
                }
                (manifest, true)
            }
            _ => {
                let manifest = ChunkManifest::new(chunks, sources);
                manifest.persist(&options.chunks_path)?;
                info!(
                    "Wrote chunk manifest with {} chunks to {}",
                    chunk_count,
                    options.chunks_path.display()
                );
                (manifest, false)
            }
        };

        let (index, origin) = Self::reconcile_index(options, &manifest, &fingerprint, &*embedder)?;

        let stats = BuildStats {
            documents: documents.len(),
            chunks: manifest.len(),
            dimension: index.as_ref().map(FlatIndex::dimension),
            manifest_reused,
            index: origin,
            fingerprint,
        };
        info!(
            "Retrieval corpus ready: {} documents, {} chunks, index {:?}",
            stats.documents, stats.chunks, stats.index
        );

        Ok(Self {
            manifest,
            index,
            embedder,
            stats,
        })
    }

    fn reconcile_index(
        options: &EngineOptions,
        manifest: &ChunkManifest,
        fingerprint: &str,
        embedder: &dyn Embedder,
    ) -> Result<(Option<FlatIndex>, IndexOrigin)> {
        if manifest.is_empty() {
            info!("Corpus is empty; no embeddings requested");
            return Ok((None, IndexOrigin::Empty));
        }

        let model = embedder.embedding_model();

        if let Some(cached) = FlatIndex::load(&options.index_path) {
            let size_matches = cached.size() == manifest.len();
            let fingerprint_matches = cached.fingerprint().is_none_or(|f| f == fingerprint);
            let model_matches = cached.embedding_model().is_none_or(|m| m == model);

            if size_matches && fingerprint_matches && model_matches {
                debug!("Reusing vector index at {}", options.index_path.display());
                return Ok((Some(cached), IndexOrigin::Reused));
            }

            warn!(
                "Persisted index at {} is stale ({} vectors for {} chunks, fingerprint {}, model {} for {}); rebuilding",
                options.index_path.display(),
                cached.size(),
                manifest.len(),
                if fingerprint_matches { "matches" } else { "differs" },
                cached.embedding_model().unwrap_or("untagged"),
                model
            );
        }

        info!(
            "Embedding {} chunks with {} in batches of {}",
            manifest.len(),
            model,
            options.batch_size
        );
        let vectors = embedder.embed(&manifest.all_chunks, options.batch_size)?;
        if vectors.len() != manifest.len() {
            return Err(crate::embeddings::EmbeddingError::CountMismatch {
                expected: manifest.len(),
                actual: vectors.len(),
            }
            .into());
        }

        let Some(index) = FlatIndex::build(&vectors)? else {
            return Ok((None, IndexOrigin::Empty));
        };
        let index = index
            .with_fingerprint(fingerprint)
            .with_embedding_model(model);
        index.persist(&options.index_path)?;

        Ok((Some(index), IndexOrigin::Rebuilt))
    }

    /// The `k` chunks nearest to `query`, nearest first.
    ///
    /// Returns fewer than `k` results when the corpus is smaller, and none for
    /// an empty corpus or `k == 0`.
    #[inline]
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let Some(index) = self.index.as_ref().filter(|_| k > 0) else {
            return Ok(Vec::new());
        };

        let query_vector = self.embedder.embed_query(query)?;
        let (distances, positions) = index.search(&query_vector, k)?;

        let results = positions
            .into_iter()
            .zip(distances)
            .map(|(position, distance)| {
                let chunk = self.manifest.all_chunks.get(position);
                let source = self.manifest.chunk_sources.get(position);
                match (chunk, source) {
                    (Some(chunk), Some(source)) => Ok(RetrievedChunk {
                        chunk: chunk.clone(),
                        source: source.clone(),
                        distance,
                    }),
                    _ => Err(RagError::Other(anyhow::anyhow!(
                        "Index position {position} has no chunk"
                    ))),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Retrieved {} chunks for query", results.len());
        Ok(results)
    }

    #[inline]
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Number of chunks in the corpus
    #[inline]
    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    #[inline]
    pub fn chunks(&self) -> &[String] {
        &self.manifest.all_chunks
    }

    #[inline]
    pub fn sources(&self) -> &[String] {
        &self.manifest.chunk_sources
    }
}
