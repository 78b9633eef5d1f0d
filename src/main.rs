use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use doc_qa::commands::{
    ask_question, load_config, resolve_config_dir, run_chat, show_config, show_status,
    upload_files, write_config,
};
use doc_qa::config::CONFIG_DIR_ENV;
use doc_qa::pipeline::KnowledgeBase;

#[derive(Parser)]
#[command(name = "doc-qa")]
#[command(about = "Ask questions about your documents, answered from their own text")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the local index
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add documents (PDF or text) to the knowledge base
    Upload {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer a single question
    Ask {
        question: String,
    },
    /// Answer questions read line by line from stdin
    Chat,
    /// Show embedding service, language model and index status
    Status,
    /// Write the configuration file, or print it with --show
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&load_config(&config_dir)?);
            } else {
                let path = write_config(&config_dir)?;
                println!("Configuration written to {}", path.display());
            }
        }
        Commands::Status => {
            show_status(&load_config(&config_dir)?)?;
        }
        Commands::Upload { files } => {
            let knowledge_base = KnowledgeBase::from_config(&load_config(&config_dir)?)?;
            let failures = upload_files(&knowledge_base, &files);
            if failures > 0 {
                bail!("{} of {} documents could not be processed", failures, files.len());
            }
        }
        Commands::Ask { question } => {
            let knowledge_base = KnowledgeBase::from_config(&load_config(&config_dir)?)?;
            ask_question(&knowledge_base, &question);
        }
        Commands::Chat => {
            let knowledge_base = KnowledgeBase::from_config(&load_config(&config_dir)?)?;
            if io::stdin().is_terminal() {
                eprintln!("Ask a question about your documents (\"exit\" to quit).");
            }
            run_chat(&knowledge_base, io::stdin().lock(), io::stdout().lock())?;
        }
    }

    Ok(())
}
