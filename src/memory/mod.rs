// Conversation memory
// One durable history record per user, capped to the most recent exchanges

pub(crate) mod record;


use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::storage::write_atomically;
use crate::{RagError, Result};

/// Storage key used when a user id has no safe characters at all
const EMPTY_KEY: &str = "_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryFormat {
    /// `<user>.json`: an array of `{timestamp, question, answer}` objects
    #[default]
    Json,
    /// `<user>.txt`: `[timestamp]` / `Q: ` / `A: ` blocks separated by `---`
    Text,
}

impl HistoryFormat {
    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(with = "record::timestamp")]
    pub timestamp: NaiveDateTime,
    pub question: String,
    pub answer: String,
}

impl Exchange {
    /// An exchange stamped with the current local time, to the second
    #[inline]
    pub fn now(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Reduce a user id to ASCII letters, digits, `_` and `-`.
///
/// Distinct ids that reduce to the same key share one history record.
#[inline]
pub fn sanitize_user_id(user_id: &str) -> String {
    let key: String = user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect();

    if key.is_empty() {
        EMPTY_KEY.to_string()
    } else {
        key
    }
}

/// Per-user conversation log backed by one file per sanitized user id.
///
/// Each user's read-modify-write runs under that user's own lock, so
/// concurrent exchanges for one user are never lost and different users
/// never wait on each other.
#[derive(Debug)]
pub struct ConversationMemory {
    storage_dir: PathBuf,
    max_history: usize,
    format: HistoryFormat,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationMemory {
    /// Open (creating if needed) the history directory
    #[inline]
    pub fn new(
        storage_dir: impl Into<PathBuf>,
        max_history: usize,
        format: HistoryFormat,
    ) -> Result<Self> {
        let storage_dir = storage_dir.into();
        fs::create_dir_all(&storage_dir)?;

        debug!(
            "Conversation memory at {} keeps {} exchanges per user ({:?})",
            storage_dir.display(),
            max_history,
            format
        );

        Ok(Self {
            storage_dir,
            max_history: max_history.max(1),
            format,
            locks: Mutex::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    #[inline]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    #[inline]
    pub fn format(&self) -> HistoryFormat {
        self.format
    }

    /// Path of the record holding `user_id`'s history
    #[inline]
    pub fn record_path(&self, user_id: &str) -> PathBuf {
        self.path_for_key(&sanitize_user_id(user_id))
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.storage_dir
            .join(format!("{key}.{}", self.format.extension()))
    }

    /// Run `f` while holding `key`'s lock. The lock's map entry is dropped
    /// again once nobody else holds or waits on it.
    fn with_key_locked<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }

    fn read_record(&self, path: &Path) -> Vec<Exchange> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read history {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        record::decode(&content, self.format).unwrap_or_else(|e| {
            warn!(
                "Treating unreadable history {} as empty: {:#}",
                path.display(),
                e
            );
            Vec::new()
        })
    }

    /// Append an exchange stamped with the current time, keeping only the
    /// newest `max_history` exchanges.
    #[inline]
    pub fn add_exchange(&self, user_id: &str, question: &str, answer: &str) -> Result<()> {
        self.push_exchange(user_id, Exchange::now(question, answer))
    }

    /// Append a pre-built exchange under the same retention rule as
    /// [`ConversationMemory::add_exchange`]
    #[inline]
    pub fn push_exchange(&self, user_id: &str, exchange: Exchange) -> Result<()> {
        let key = sanitize_user_id(user_id);
        let path = self.path_for_key(&key);

        self.with_key_locked(&key, || {
            let mut history = self.read_record(&path);
            history.push(exchange);
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(..excess);
            }

            let encoded = record::encode(&history, self.format)
                .map_err(|e| RagError::Memory(format!("{e:#}")))?;
            write_atomically(&path, encoded.as_bytes()).map_err(|e| {
                RagError::Memory(format!(
                    "Failed to write history {}: {}",
                    path.display(),
                    e
                ))
            })?;

            debug!(
                "Stored exchange for user {} ({} in history)",
                key,
                history.len()
            );
            Ok(())
        })
    }

    /// Exchanges for `user_id`, oldest first. Missing or unreadable records
    /// read as empty.
    #[inline]
    pub fn get_history(&self, user_id: &str) -> Vec<Exchange> {
        self.read_record(&self.record_path(user_id))
    }

    /// History rendered as a prompt block, or an empty string when there is
    /// no history
    #[inline]
    pub fn format_history_for_prompt(&self, user_id: &str) -> String {
        let history = self.get_history(user_id);
        if history.is_empty() {
            return String::new();
        }

        let mut formatted = String::from(
            "=== PREVIOUS CONVERSATION HISTORY ===\n\
             You have access to the following conversation history with this user.\n\
             Use this context to provide continuity and reference previous discussions when relevant.\n\n",
        );
        for exchange in &history {
            formatted.push('[');
            formatted.push_str(&exchange.timestamp.format(record::TIMESTAMP_FORMAT).to_string());
            formatted.push_str("]\nUser: ");
            formatted.push_str(&exchange.question);
            formatted.push_str("\nYou: ");
            formatted.push_str(&exchange.answer);
            formatted.push_str("\n\n");
        }
        formatted.push_str("=== END OF CONVERSATION HISTORY ===\n\n");

        formatted
    }

    /// Delete the user's record. Returns whether one existed.
    #[inline]
    pub fn clear_history(&self, user_id: &str) -> Result<bool> {
        let key = sanitize_user_id(user_id);
        let path = self.path_for_key(&key);

        self.with_key_locked(&key, || match fs::remove_file(&path) {
            Ok(()) => {
                info!("Cleared conversation history for user {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RagError::Memory(format!(
                "Failed to remove history {}: {}",
                path.display(),
                e
            ))),
        })
    }

    #[inline]
    pub fn get_conversation_count(&self, user_id: &str) -> usize {
        self.get_history(user_id).len()
    }

    /// True only when a non-empty record exists
    #[inline]
    pub fn user_has_history(&self, user_id: &str) -> bool {
        fs::metadata(self.record_path(user_id))
            .is_ok_and(|metadata| metadata.is_file() && metadata.len() > 0)
    }
}
