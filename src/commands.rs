
use anyhow::{Context, Result};
use console::style;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{Config, IndexBackend, get_config_dir};
use crate::embeddings::OllamaClient;
use crate::pipeline::KnowledgeBase;

const EXIT_COMMAND: &str = "exit";

/// Resolve the configuration directory, preferring an explicit one
#[inline]
pub fn resolve_config_dir(config_dir: Option<PathBuf>) -> Result<PathBuf> {
    match config_dir {
        Some(dir) => Ok(dir),
        None => get_config_dir().context("Failed to determine configuration directory"),
    }
}

#[inline]
pub fn load_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).context("Failed to load configuration")
}

/// Ingest each file in turn; returns how many failed
#[inline]
pub fn upload_files(knowledge_base: &KnowledgeBase, files: &[PathBuf]) -> usize {
    let mut failures = 0;

    for path in files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let result = knowledge_base.ingest_file(path);
        if let Ok(report) = &result {
            info!(
                "{}: {} characters in {} chunks",
                report.filename, report.characters, report.chunks
            );
        } else {
            failures += 1;
        }

        println!("{}", KnowledgeBase::upload_message(&filename, &result));
    }

    failures
}

#[inline]
pub fn ask_question(knowledge_base: &KnowledgeBase, question: &str) {
    println!("{}", knowledge_base.respond(question));
}

/// Answer one question per input line until EOF or `exit`
#[inline]
pub fn run_chat<R: BufRead, W: Write>(
    knowledge_base: &KnowledgeBase,
    input: R,
    mut output: W,
) -> Result<()> {
    for line in input.lines() {
        let line = line.context("Failed to read question")?;
        let question = line.trim();

        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case(EXIT_COMMAND) {
            break;
        }

        writeln!(output, "{}", knowledge_base.respond(question))
            .context("Failed to write answer")?;
        output.flush().context("Failed to write answer")?;
    }

    Ok(())
}

/// Print connectivity and index status
#[inline]
pub fn show_status(config: &Config) -> Result<()> {
    println!("📊 Doc-QA Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Embedding Service:");
    match OllamaClient::new(&config.embedding) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!("   ✅ Ollama: Connected ({})", client.base_url());
                println!("   📋 Model: {}", config.embedding.model);
                println!("   🔢 Dimension: {}", config.embedding.dimension);
            }
            Err(e) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
        },
        Err(e) => println!("   ❌ Ollama: Misconfigured - {:#}", e),
    }

    println!("💬 Language Model:");
    match config.llm.api_key() {
        Ok(_) => println!("   ✅ {} via {}", config.llm.model, config.llm.base_url),
        Err(e) => println!("   ⚠️  {}", e),
    }

    println!("🔍 Index:");
    match KnowledgeBase::from_config(config) {
        Ok(knowledge_base) => match knowledge_base.status() {
            Ok(status) if status.index_exists => {
                println!("   ✅ Backend: {}", status.backend);
                println!("   📦 Entries: {}", status.entries);
            }
            Ok(status) => {
                println!("   💤 Backend: {} (no index yet)", status.backend);
                println!("   Upload a document to create it.");
            }
            Err(e) => println!("   ❌ Index unavailable - {}", e),
        },
        Err(e) => println!("   ❌ Failed to open index - {}", e),
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    println!("{}", style("📋 Current Configuration").bold().cyan());
    println!();

    println!("{}", style("Embedding Settings:").bold().yellow());
    match config.embedding.embedding_url() {
        Ok(url) => println!("  URL: {}", style(url).cyan()),
        Err(e) => println!("  URL: {} ({})", style("Invalid").red(), e),
    }
    println!("  Model: {}", style(&config.embedding.model).cyan());
    println!("  Dimension: {}", style(config.embedding.dimension).cyan());
    println!("  Batch Size: {}", style(config.embedding.batch_size).cyan());

    println!();
    println!("{}", style("Language Model Settings:").bold().yellow());
    println!("  Base URL: {}", style(&config.llm.base_url).cyan());
    println!("  Model: {}", style(&config.llm.model).cyan());
    println!("  Temperature: {}", style(config.llm.temperature).cyan());
    println!("  API Key Variable: {}", style(&config.llm.api_key_env).cyan());

    println!();
    println!("{}", style("Retrieval Settings:").bold().yellow());
    println!("  Chunk Size: {}", style(config.chunking.max_size).cyan());
    println!("  Chunk Overlap: {}", style(config.chunking.overlap).cyan());
    println!("  Top K: {}", style(config.retrieval.top_k).cyan());

    println!();
    println!("{}", style("Index Settings:").bold().yellow());
    println!("  Backend: {}", style(config.index.backend).cyan());
    match config.index.backend {
        IndexBackend::Local => {
            println!("  Path: {}", style(config.local_index_path().display()).cyan());
        }
        IndexBackend::Remote => {
            let remote = &config.index.remote;
            println!("  Index: {}", style(&remote.index_name).cyan());
            println!(
                "  Host: {}",
                style(remote.host.as_deref().unwrap_or("(not set)")).cyan()
            );
            println!("  Namespace: {}", style(&remote.namespace).cyan());
        }
    }

    println!();
    println!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

/// Write `config.toml`, keeping any settings already present
#[inline]
pub fn write_config(config_dir: &Path) -> Result<PathBuf> {
    let config = match Config::load(config_dir) {
        Ok(config) => config,
        Err(e) => {
            warn!("Existing configuration is unusable, writing defaults: {:#}", e);
            Config::with_base_dir(config_dir)
        }
    };

    config.save()?;
    Ok(config.config_file_path())
}
