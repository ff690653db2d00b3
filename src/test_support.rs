// Deterministic stand-ins for the Ollama-backed embedder and chat model

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::answer::ChatModel;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::{RagError, Result};

const DEFAULT_LETTERS: &[char] = &['a', 'b', 'c'];

/// Embeds text as the relative frequency of a few letters, counting calls
#[derive(Debug)]
pub(crate) struct FakeEmbedder {
    model: &'static str,
    letters: &'static [char],
    batch_calls: AtomicUsize,
    embedded_texts: AtomicUsize,
    offline: bool,
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::named("letters-abc", DEFAULT_LETTERS)
    }
}

impl FakeEmbedder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// An embedder reporting `model` whose vectors count `letters`
    pub(crate) fn named(model: &'static str, letters: &'static [char]) -> Self {
        Self {
            model,
            letters,
            batch_calls: AtomicUsize::new(0),
            embedded_texts: AtomicUsize::new(0),
            offline: false,
        }
    }

    /// Every request fails as if the service were unreachable
    pub(crate) fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub(crate) fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn embedded_texts(&self) -> usize {
        self.embedded_texts.load(Ordering::SeqCst)
    }
}

impl Embedder for FakeEmbedder {
    fn embedding_model(&self) -> &str {
        self.model
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);

        if self.offline {
            return Err(EmbeddingError::Request("connection refused".to_string()));
        }

        Ok(texts
            .iter()
            .map(|text| frequency_profile(text, self.letters))
            .collect())
    }
}

pub(crate) fn letter_profile(text: &str) -> Vec<f32> {
    frequency_profile(text, DEFAULT_LETTERS)
}

fn frequency_profile(text: &str, letters: &[char]) -> Vec<f32> {
    let total = text.chars().count().max(1) as f32;
    letters
        .iter()
        .map(|&letter| text.chars().filter(|&c| c == letter).count() as f32 / total)
        .collect()
}

/// Chat model that records every prompt and answers with a fixed reply
#[derive(Debug)]
pub(crate) struct ScriptedChat {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub(crate) fn answering(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log lock").clone()
    }
}

impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| RagError::Chat("model unavailable".to_string()))
    }
}
