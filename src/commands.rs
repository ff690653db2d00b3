use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use std::sync::Arc;
use tracing::{info, warn};

use crate::answer::Assistant;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::memory::ConversationMemory;
use crate::retrieval::{EngineSlot, IndexOrigin, RetrievalEngine};

fn connect(config: &Config) -> Result<Arc<OllamaClient>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;

    if let Err(e) = client.health_check() {
        warn!("Ollama health check failed: {:#}", e);
        eprintln!(
            "{} {}",
            style("⚠ Ollama is not ready:").yellow(),
            style(format!("{e:#}")).dim()
        );
    }

    Ok(Arc::new(client))
}

fn open_memory(config: &Config) -> Result<Arc<ConversationMemory>> {
    let memory = ConversationMemory::new(
        config.history_dir(),
        config.memory.max_history,
        config.memory.format,
    )
    .context("Failed to open conversation history")?;
    Ok(Arc::new(memory))
}

fn build_engine(config: &Config, client: &Arc<OllamaClient>) -> Result<Arc<EngineSlot>> {
    let slot = Arc::new(EngineSlot::new());
    let engine = slot
        .build(&config.engine_options(), Arc::<OllamaClient>::clone(client))
        .context("Failed to build retrieval index")?;
    print_stats(&engine);
    Ok(slot)
}

fn print_stats(engine: &RetrievalEngine) {
    let stats = engine.stats();
    let origin = match stats.index {
        IndexOrigin::Reused => style("reused from cache").green(),
        IndexOrigin::Rebuilt => style("rebuilt").yellow(),
        IndexOrigin::Empty => style("empty corpus").red(),
    };

    println!("Documents: {}", stats.documents);
    println!("Chunks: {}", stats.chunks);
    if let Some(dimension) = stats.dimension {
        println!("Dimension: {}", dimension);
    }
    println!("Index: {}", origin);
    println!(
        "Chunk manifest: {}",
        if stats.manifest_reused {
            "reused"
        } else {
            "written"
        }
    );
    println!("Fingerprint: {}", style(&stats.fingerprint).dim());
}

/// Build or refresh the chunk manifest and vector index
#[inline]
pub fn build_index(config: &Config) -> Result<()> {
    info!(
        "Indexing documents in {}",
        config.documents_dir().display()
    );
    let client = connect(config)?;
    build_engine(config, &client)?;
    println!("{}", style("✓ Index ready").green());
    Ok(())
}

/// Print the chunks nearest to `query`
#[inline]
pub fn search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let client = connect(config)?;
    let slot = build_engine(config, &client)?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let results = slot.retrieve(query, k).context("Search failed")?;
    if results.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }

    println!();
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{} {} {}",
            style(format!("#{}", rank + 1)).bold(),
            style(&result.source).cyan(),
            style(format!("(distance {:.4})", result.distance)).dim()
        );
        println!("{}", result.chunk);
        println!();
    }

    Ok(())
}

/// Interactive question loop for one user; `Q` quits
#[inline]
pub fn ask(config: &Config, user_id: &str) -> Result<()> {
    let client = connect(config)?;
    let engine = build_engine(config, &client)?;
    let memory = open_memory(config)?;
    let assistant = Assistant::new(engine, memory, client, config.retrieval.top_k);

    println!();
    loop {
        let question: String = Input::new()
            .with_prompt("Question (Q to quit)")
            .interact_text()?;
        let question = question.trim();

        if question.eq_ignore_ascii_case("q") {
            println!("Goodbye.");
            break;
        }

        println!();
        let answer = assistant.reply(user_id, question);
        println!("{}", style("ANSWER:").bold());
        println!("{}", answer);
        println!();
        println!(
            "Total conversations for {}: {}",
            user_id,
            assistant.memory().get_conversation_count(user_id)
        );
    }

    Ok(())
}

/// Print a user's stored exchanges, oldest first
#[inline]
pub fn show_history(config: &Config, user_id: &str) -> Result<()> {
    let memory = open_memory(config)?;
    let history = memory.get_history(user_id);

    if history.is_empty() {
        println!("No conversation history for {}", user_id);
        return Ok(());
    }

    for exchange in &history {
        println!("{}", style(format!("[{}]", exchange.timestamp)).dim());
        println!("{} {}", style("Q:").bold(), exchange.question);
        println!("{} {}", style("A:").bold(), exchange.answer);
        println!();
    }
    println!(
        "{} exchanges stored in {}",
        history.len(),
        memory.record_path(user_id).display()
    );

    Ok(())
}

#[inline]
pub fn clear_history(config: &Config, user_id: &str) -> Result<()> {
    let memory = open_memory(config)?;
    if memory.clear_history(user_id)? {
        println!("{}", style(format!("✓ Cleared history for {user_id}")).green());
    } else {
        println!("No conversation history for {}", user_id);
    }
    Ok(())
}

#[inline]
pub fn count_history(config: &Config, user_id: &str) -> Result<()> {
    let memory = open_memory(config)?;
    println!(
        "Total conversations for {}: {}",
        user_id,
        memory.get_conversation_count(user_id)
    );
    Ok(())
}

/// Ask the chat model to summarise what the user has learned so far and
/// save the summary to the configured summary directory
#[inline]
pub fn summarize_history(config: &Config, user_id: &str) -> Result<()> {
    let client = connect(config)?;
    let memory = open_memory(config)?;
    let assistant = Assistant::new(
        Arc::new(EngineSlot::new()),
        memory,
        client,
        config.retrieval.top_k,
    );

    let summary = assistant
        .save_history_summary(user_id, &config.summary_dir())
        .with_context(|| format!("Failed to summarize history for {user_id}"))?;
    println!("{}", summary.text);
    println!();
    println!(
        "{}",
        style(format!("✓ Saved to {}", summary.path.display())).green()
    );
    Ok(())
}
