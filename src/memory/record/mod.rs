// On-disk encodings of a user's conversation history

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::warn;

use super::{Exchange, HistoryFormat};

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TEXT_SEPARATOR: &str = "\n---\n";
const QUESTION_PREFIX: &str = "Q: ";
const ANSWER_PREFIX: &str = "A: ";

/// Serde adapter writing timestamps as `2024-01-31 09:15:00`
pub(crate) mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use super::TIMESTAMP_FORMAT;

    pub(crate) fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(D::Error::custom)
    }
}

pub(crate) fn encode(exchanges: &[Exchange], format: HistoryFormat) -> Result<String> {
    match format {
        HistoryFormat::Json => {
            serde_json::to_string_pretty(exchanges).context("Failed to encode history as JSON")
        }
        HistoryFormat::Text => Ok(encode_text(exchanges)),
    }
}

pub(crate) fn decode(content: &str, format: HistoryFormat) -> Result<Vec<Exchange>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    match format {
        HistoryFormat::Json => {
            serde_json::from_str(content).context("History record is not a valid JSON array")
        }
        HistoryFormat::Text => Ok(decode_text(content)),
    }
}

fn encode_text(exchanges: &[Exchange]) -> String {
    let mut out = String::new();
    for exchange in exchanges {
        out.push('[');
        out.push_str(&exchange.timestamp.format(TIMESTAMP_FORMAT).to_string());
        out.push_str("]\n");
        out.push_str(QUESTION_PREFIX);
        out.push_str(&exchange.question);
        out.push('\n');
        out.push_str(ANSWER_PREFIX);
        out.push_str(&exchange.answer);
        out.push('\n');
        out.push_str(TEXT_SEPARATOR);
        out.push('\n');
    }
    out
}

/// Parse the line-prefixed text layout.
///
/// Units with fewer than three lines or an unreadable timestamp are skipped.
/// The answer starts at the first `A: ` line and runs to the end of the unit,
/// so continuation lines of a multi-line answer are kept without a prefix.
fn decode_text(content: &str) -> Vec<Exchange> {
    let mut exchanges = Vec::new();

    for unit in content.split(TEXT_SEPARATOR) {
        let unit = unit.trim();
        if unit.is_empty() {
            continue;
        }

        let lines: Vec<&str> = unit.split('\n').collect();
        let [timestamp_line, question_line, rest @ ..] = lines.as_slice() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let raw_timestamp = timestamp_line.trim_matches(['[', ']']).trim();
        let Ok(timestamp) = NaiveDateTime::parse_from_str(raw_timestamp, TIMESTAMP_FORMAT) else {
            warn!("Skipping history entry with unrecognised timestamp {raw_timestamp:?}");
            continue;
        };

        let question = question_line
            .strip_prefix(QUESTION_PREFIX)
            .unwrap_or(*question_line);

        let mut answer_lines: Vec<&str> = Vec::new();
        for &line in rest {
            if let Some(first) = line.strip_prefix(ANSWER_PREFIX) {
                answer_lines.push(first);
            } else if !answer_lines.is_empty() {
                answer_lines.push(line);
            }
        }

        exchanges.push(Exchange {
            timestamp,
            question: question.to_string(),
            answer: answer_lines.join("\n"),
        });
    }

    exchanges
}
