// Publication point for the process-wide retrieval engine


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};

use super::{EngineOptions, EngineState, RetrievalEngine, RetrievedChunk};
use crate::embeddings::Embedder;
use crate::{RagError, Result};

/// Holds the engine request handlers query.
///
/// A build runs outside the slot and only becomes visible when published, so
/// readers see either the previous engine or the finished new one. A build
/// that fails or is dropped leaves the slot as it was.
#[derive(Debug, Default)]
pub struct EngineSlot {
    engine: RwLock<Option<Arc<RetrievalEngine>>>,
    building: AtomicBool,
}

/// Marks a build in progress until it is published or dropped
#[derive(Debug)]
pub struct BuildGuard<'a> {
    slot: &'a EngineSlot,
}

impl EngineSlot {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ready` once an engine has been published, even while a rebuild runs
    #[inline]
    pub fn state(&self) -> EngineState {
        if self.get().is_some() {
            EngineState::Ready
        } else if self.building.load(Ordering::Acquire) {
            EngineState::Building
        } else {
            EngineState::Uninitialized
        }
    }

    /// Start a build. Returns `None` if another build is already running.
    #[inline]
    pub fn begin_build(&self) -> Option<BuildGuard<'_>> {
        if self
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Retrieval engine build already in progress");
            return None;
        }

        Some(BuildGuard { slot: self })
    }

    /// The published engine, if any
    #[inline]
    pub fn get(&self) -> Option<Arc<RetrievalEngine>> {
        self.engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }

    /// Construct an engine and publish it in one step
    #[inline]
    pub fn build(
        &self,
        options: &EngineOptions,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Arc<RetrievalEngine>> {
        let guard = self.begin_build().ok_or(RagError::NotReady(EngineState::Building))?;
        let engine = RetrievalEngine::construct(options, embedder)?;
        Ok(guard.publish(engine))
    }

    /// Query the published engine. Calling this before any engine is ready
    /// is a programming error and fails immediately.
    #[inline]
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let Some(engine) = self.get() else {
            let state = self.state();
            error!("Retrieval requested while the engine is {}", state);
            return Err(RagError::NotReady(state));
        };

        engine.retrieve(query, k)
    }
}

impl BuildGuard<'_> {
    /// Make `engine` visible to readers, replacing any previous engine
    #[inline]
    pub fn publish(self, engine: RetrievalEngine) -> Arc<RetrievalEngine> {
        let engine = Arc::new(engine);
        *self
            .slot
            .engine
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&engine));
        info!("Retrieval engine published");
        engine
    }
}

impl Drop for BuildGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.slot.building.store(false, Ordering::Release);
    }
}
