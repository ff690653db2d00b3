// Answer composition
// Joins retrieved chunks and conversation history into one chat prompt


use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::memory::{ConversationMemory, sanitize_user_id};
use crate::retrieval::{EngineSlot, RetrievedChunk};
use crate::storage::write_atomically;
use crate::{RagError, Result};

/// Shown to the user instead of any internal error
pub const FALLBACK_REPLY: &str =
    "Sorry, I could not answer that right now. Please try again in a moment.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// A completion backend that answers a single prompt
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the chat prompt from the history block, the retrieved chunks and
/// the question. An empty `history` leaves no history section at all.
#[inline]
pub fn compose_prompt(history: &str, retrieved: &[RetrievedChunk], question: &str) -> String {
    let document_context = retrieved
        .iter()
        .map(|r| r.chunk.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!(
        "You are a helpful AI assistant with access to both document knowledge and conversation history.

{history}
INSTRUCTIONS:
1. Use the conversation history above to maintain context and continuity, but only if there is relevant history.
2. Use the document context below as your primary knowledge source
3. If the question relates to something discussed earlier, acknowledge it
4. Be conversational and natural while staying accurate to the documents.
5. Do not explicitly mention the use of documents in your answers, unless it makes sense for the question.
6. Be concise, unless asked otherwise.

DOCUMENT CONTEXT:
{document_context}

CURRENT QUESTION FROM USER:
{question}

YOUR RESPONSE:
"
    )
}

fn summary_prompt(memory: &ConversationMemory, user_id: &str) -> Option<String> {
    let history = memory.get_history(user_id);
    if history.is_empty() {
        return None;
    }

    let transcript = history
        .iter()
        .map(|e| format!("User: {}\nYou: {}", e.question, e.answer))
        .collect::<Vec<_>>()
        .join("\n\n");

    Some(format!(
        "Summarize what the user appears to know based on the following conversation history.
Focus on facts/topics the user has asked about or been told. Avoid guessing at motivations or adding new facts.

CONVERSATION HISTORY:
{transcript}

SUMMARY:"
    ))
}

/// A saved summary of what one user has asked about and been told
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeSummary {
    pub text: String,
    pub path: PathBuf,
}

/// File a user's knowledge summary is saved to inside `summary_dir`
#[inline]
pub fn summary_path(summary_dir: &Path, user_id: &str) -> PathBuf {
    summary_dir.join(format!("{}_knowledge.txt", sanitize_user_id(user_id)))
}

/// Answers questions for many users against one shared corpus
pub struct Assistant {
    engine: Arc<EngineSlot>,
    memory: Arc<ConversationMemory>,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
}

impl Assistant {
    #[inline]
    pub fn new(
        engine: Arc<EngineSlot>,
        memory: Arc<ConversationMemory>,
        chat: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            engine,
            memory,
            chat,
            top_k,
        }
    }

    #[inline]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    #[inline]
    pub fn engine(&self) -> &EngineSlot {
        &self.engine
    }

    /// Retrieve context, ask the chat model and record the exchange.
    ///
    /// Failing to record the exchange is logged but does not fail the answer.
    #[inline]
    pub fn answer(&self, user_id: &str, question: &str) -> Result<String> {
        let retrieved = self.engine.retrieve(question, self.top_k)?;
        let history = self.memory.format_history_for_prompt(user_id);
        let prompt = compose_prompt(&history, &retrieved, question);

        debug!(
            "Asking {} with {} chunks and {} chars of history",
            self.chat.model_name(),
            retrieved.len(),
            history.len()
        );
        let answer = self.chat.complete(&prompt)?;

        if let Err(e) = self.memory.add_exchange(user_id, question, &answer) {
            warn!("Could not record exchange for {}: {}", user_id, e);
        }

        Ok(answer)
    }

    /// Like [`Assistant::answer`], but never fails: errors are logged and
    /// replaced with [`FALLBACK_REPLY`]
    #[inline]
    pub fn reply(&self, user_id: &str, question: &str) -> String {
        self.answer(user_id, question).unwrap_or_else(|e| {
            error!("Failed to answer question for {}: {}", user_id, e);
            FALLBACK_REPLY.to_string()
        })
    }

    /// Ask the chat model what the user seems to know, based on their history
    #[inline]
    pub fn summarize_history(&self, user_id: &str) -> Result<String> {
        let Some(prompt) = summary_prompt(&self.memory, user_id) else {
            return Err(RagError::Memory(format!(
                "No conversation history for {user_id}"
            )));
        };

        let summary = self.chat.complete(&prompt)?;
        info!("Summarized conversation history for {}", user_id);
        Ok(summary.trim().to_string())
    }

    /// Summarize the user's history and save it under `summary_dir`,
    /// replacing any earlier summary for the same user
    #[inline]
    pub fn save_history_summary(
        &self,
        user_id: &str,
        summary_dir: &Path,
    ) -> Result<KnowledgeSummary> {
        let text = self.summarize_history(user_id)?;
        let path = summary_path(summary_dir, user_id);

        write_atomically(&path, text.as_bytes()).map_err(|e| {
            RagError::Memory(format!(
                "Failed to write summary {}: {}",
                path.display(),
                e
            ))
        })?;

        info!("Saved knowledge summary for {} to {}", user_id, path.display());
        Ok(KnowledgeSummary { text, path })
    }
}
