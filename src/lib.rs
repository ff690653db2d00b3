use thiserror::Error;

use crate::config::ConfigError;
use crate::embeddings::EmbeddingError;
use crate::index::IndexError;
use crate::retrieval::EngineState;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("Retrieval engine queried while {0}")]
    NotReady(EngineState),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod answer;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extractor;
pub mod index;
pub mod memory;
pub mod retrieval;
mod storage;
#[cfg(test)]
mod test_support;
