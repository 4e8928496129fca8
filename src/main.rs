//! # rag-debug CLI (`ragdbg`)
//!
//! Hosts a demo debug server or connects to one as an inspector.
//!
//! ## Usage
//!
//! ```bash
//! ragdbg --config ./config/ragdbg.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdbg serve [--demo]` | Enable the bus and run the debug server until Ctrl-C |
//! | `ragdbg watch` | Print replayed and live events as JSON lines |
//! | `ragdbg ping` | Round-trip a ping |
//! | `ragdbg doctor` | Show registered collaborators and capabilities |
//! | `ragdbg stats` | Store statistics |
//! | `ragdbg docs [--prefix P]` | List documents |
//! | `ragdbg get <source-id>` | Show one document and its chunks |
//! | `ragdbg query "<text>" [--top-k N]` | Run a retrieval |
//! | `ragdbg ingest <source-id> <file>` | Ingest a file's contents |
//! | `ragdbg delete <source-id>` | Delete a document |
//! | `ragdbg buffer [--clear]` | Show or clear the server's replay buffer |
//! | `ragdbg eval <dataset>` | Run the eval module |
//!
//! One-shot commands print the result as JSON and exit non-zero when the
//! server reports `success: false`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rag_debug::bus;
use rag_debug::client::{ClientOptions, ConnectionStatus, DebugClient};
use rag_debug::config::{self, Config};
use rag_debug::host::{IngestInput, RagEngine};
use rag_debug::logging;
use rag_debug::memory::MemoryEngine;
use rag_debug::protocol::{DebugCommand, DebugEvent};
use rag_debug::server::DebugServer;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// rag-debug: inspect a running RAG pipeline.
#[derive(Parser)]
#[command(
    name = "ragdbg",
    about = "rag-debug: live event stream and commands for a running RAG pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/ragdbg.toml")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the debug server in this process.
    Serve {
        /// Register an in-memory engine seeded with sample documents.
        #[arg(long)]
        demo: bool,
    },
    /// Stream events from a running server.
    Watch,
    /// Check that the server answers.
    Ping,
    /// Show what the server has registered.
    Doctor,
    /// Store statistics.
    Stats,
    /// List stored documents.
    Docs {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Show one document.
    Get { source_id: String },
    /// Run a retrieval.
    Query {
        query: String,
        #[arg(long, default_value_t = 8)]
        top_k: usize,
    },
    /// Ingest a file.
    Ingest { source_id: String, file: PathBuf },
    /// Delete a document.
    Delete { source_id: String },
    /// Show or clear the server's replay buffer.
    Buffer {
        #[arg(long)]
        clear: bool,
    },
    /// Run an evaluation dataset.
    Eval { dataset: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    let command = match cli.command {
        Commands::Serve { demo } => return serve(cfg, demo).await,
        Commands::Watch => return watch(&cfg).await,
        Commands::Ping => DebugCommand::Ping,
        Commands::Doctor => DebugCommand::Doctor,
        Commands::Stats => DebugCommand::StoreStats,
        Commands::Docs {
            prefix,
            limit,
            offset,
        } => DebugCommand::ListDocuments {
            prefix,
            limit,
            offset,
        },
        Commands::Get { source_id } => DebugCommand::GetDocument { source_id },
        Commands::Query { query, top_k } => DebugCommand::Query {
            query,
            top_k,
            scope: None,
        },
        Commands::Ingest { source_id, file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            DebugCommand::Ingest {
                source_id,
                content,
                metadata: None,
                chunking: None,
            }
        }
        Commands::Delete { source_id } => DebugCommand::DeleteDocument { source_id },
        Commands::Buffer { clear: true } => DebugCommand::ClearBuffer,
        Commands::Buffer { clear: false } => DebugCommand::GetBuffer,
        Commands::Eval { dataset } => DebugCommand::RunEval {
            dataset,
            options: None,
        },
    };

    run_command(&cfg, command).await
}

async fn serve(mut cfg: Config, demo: bool) -> Result<()> {
    cfg.bus.enabled = true;
    let bus = bus::init_global(&cfg.bus);

    let mut server =
        DebugServer::new(bus.clone(), cfg.server.clone()).with_eval_config(cfg.eval.clone());
    if demo {
        let engine = Arc::new(MemoryEngine::new().with_bus(bus.clone()));
        seed_demo(engine.as_ref()).await?;
        server = server.with_engine(engine.clone()).with_store(engine);
    }

    let handle = server.start().await?;
    println!("Debug server listening on {}", handle.endpoint());
    println!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.stop().await;
    Ok(())
}

async fn seed_demo(engine: &MemoryEngine) -> Result<()> {
    let samples = [
        (
            "demo/ownership.md",
            "Ownership rules: each value has one owner.\n\n\
             When the owner goes out of scope the value is dropped.",
        ),
        (
            "demo/borrowing.md",
            "The borrow checker enforces shared or exclusive access.\n\n\
             References must never outlive the value they point to.",
        ),
        (
            "demo/async.md",
            "Async functions return futures.\n\n\
             A runtime such as tokio polls futures to completion.",
        ),
    ];
    for (source_id, content) in samples {
        engine
            .ingest(IngestInput {
                source_id: source_id.to_string(),
                content: content.to_string(),
                metadata: None,
                chunking: None,
            })
            .await
            .with_context(|| format!("Failed to seed {}", source_id))?;
    }
    Ok(())
}

async fn watch(cfg: &Config) -> Result<()> {
    let client = DebugClient::connect(ClientOptions::from_config(cfg));
    client.subscribe(|event: &DebugEvent| match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("failed to encode event: {}", e),
    });

    let mut status = client.status_watch();
    eprintln!("[{}] {}", ConnectionStatus::Connecting, cfg.client_url());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                client.disconnect();
                break;
            }
            _ = client.finished() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                match client.info().error_message {
                    Some(message) if current == ConnectionStatus::Error => {
                        eprintln!("[{}] {}", current, message)
                    }
                    _ => eprintln!("[{}]", current),
                }
            }
        }
    }

    let _ = tokio::time::timeout(CLOSE_GRACE, client.finished()).await;
    if client.status() == ConnectionStatus::Error {
        let message = client.info().error_message.unwrap_or_default();
        anyhow::bail!("Debug channel error: {}", message);
    }
    Ok(())
}

async fn run_command(cfg: &Config, command: DebugCommand) -> Result<()> {
    let mut options = ClientOptions::from_config(cfg);
    options.reconnect = false;
    let client = DebugClient::connect(options);

    client
        .wait_connected(CONNECT_TIMEOUT)
        .await
        .with_context(|| format!("Could not connect to {}", cfg.client_url()))?;

    let result = client.send_command(command).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    client.disconnect();
    let _ = tokio::time::timeout(CLOSE_GRACE, client.finished()).await;

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
