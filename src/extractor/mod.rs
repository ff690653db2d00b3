
use pulldown_cmark::{Options, Parser, html};
use scraper::{Html, Node};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::embeddings::chunking::{ChunkingConfig, chunk_text};

/// A source file read fully into memory, markdown already reduced to plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
}

impl Document {
    /// Path as stored next to each chunk
    #[inline]
    pub fn source(&self) -> String {
        self.path.display().to_string()
    }
}

/// Read every supported document directly inside `folder`, sorted by path.
///
/// Files that cannot be read are skipped with a warning. A missing folder is
/// an empty corpus, not an error.
#[inline]
pub fn load_documents(folder: &Path) -> Vec<Document> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                "Could not read documents folder {}: {}",
                folder.display(),
                e
            );
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!("Skipping unreadable directory entry: {}", e);
                None
            }
        })
        .filter(|path| path.is_file() && document_kind(path).is_some())
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match read_document(&path) {
            Ok(document) => documents.push(document),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    info!(
        "Loaded {} documents from {}",
        documents.len(),
        folder.display()
    );
    documents
}

fn read_document(path: &Path) -> std::io::Result<Document> {
    let raw = fs::read_to_string(path)?;
    let text = match document_kind(path) {
        Some(DocumentKind::Markdown) => markdown_to_text(&raw),
        _ => raw,
    };

    debug!("Read {} ({} chars)", path.display(), text.chars().count());
    Ok(Document {
        path: path.to_path_buf(),
        text,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    PlainText,
    Markdown,
}

fn document_kind(path: &Path) -> Option<DocumentKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "txt" => Some(DocumentKind::PlainText),
        "md" => Some(DocumentKind::Markdown),
        _ => None,
    }
}

/// Render markdown to HTML, then keep only its visible text.
///
/// Each text node becomes its own line; lines are trimmed and blank lines
/// dropped, so headings, list items and paragraphs end up one per line.
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(markdown, options);

    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, parser);

    html_to_text(&rendered)
}

fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut lines: Vec<&str> = Vec::new();

    for node in fragment.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        });
        if hidden {
            continue;
        }

        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        );
    }

    lines.join("\n")
}

/// Chunk each document in order, returning chunks with a parallel list of
/// their source paths.
#[inline]
pub fn chunk_documents(
    documents: &[Document],
    config: &ChunkingConfig,
) -> (Vec<String>, Vec<String>) {
    let mut all_chunks = Vec::new();
    let mut chunk_sources = Vec::new();

    for document in documents {
        let chunks = chunk_text(&document.text, config);
        let source = document.source();
        chunk_sources.extend(std::iter::repeat_n(source, chunks.len()));
        all_chunks.extend(chunks);
    }

    debug!(
        "Chunked {} documents into {} chunks",
        documents.len(),
        all_chunks.len()
    );
    (all_chunks, chunk_sources)
}

/// Load and chunk a documents folder in one step
#[inline]
pub fn get_chunks(folder: &Path, config: &ChunkingConfig) -> (Vec<String>, Vec<String>) {
    chunk_documents(&load_documents(folder), config)
}
