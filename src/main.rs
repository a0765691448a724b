//! Binary entry point for ifc-chat.
//!
//! This binary provides the CLI interface: flatten an IFC model, upload it to a
//! hosted assistant, and ask questions about it.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow unnecessary_wraps for consistent command function signatures
#![allow(clippy::unnecessary_wraps)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use ifc_chat::assistant::{RunEvent, RunEventSink};
use ifc_chat::config::IfcChatConfig;
use ifc_chat::services::{self, BridgeSettings, ChatService, ConversationBridge};
use ifc_chat::{observability, rendering};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// ifc-chat - Talk to your building models.
#[derive(Parser)]
#[command(name = "ifc-chat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "IFC_CHAT_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flatten an IFC model into records JSON (no network).
    Flatten {
        /// The IFC file.
        file: PathBuf,

        /// IFC class to extract (subtypes included).
        #[arg(long)]
        class: Option<String>,

        /// Output path (default: the scratch model data file).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Flatten an IFC model and start a new assistant session with it.
    Upload {
        /// The IFC file.
        file: PathBuf,
    },

    /// Ask a question about the uploaded model.
    Ask {
        /// The question.
        question: String,

        /// Write the HTML transcript to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the assistant's output live while the run streams.
        #[arg(long)]
        live: bool,
    },

    /// Delete the stored assistant session.
    Close,

    /// Show model data and session state.
    Status {
        /// Print the included documents as HTML.
        #[arg(long)]
        html: bool,
    },

    /// Manage configuration.
    Config {
        /// Show effective configuration.
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_settings(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn run_command(cli: Cli, config: IfcChatConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Flatten {
            file,
            class,
            output,
        } => cmd_flatten(&config, &file, class.as_deref(), output),
        Commands::Upload { file } => cmd_upload(config, &file),
        Commands::Ask {
            question,
            output,
            live,
        } => cmd_ask(config, &question, output.as_deref(), live),
        Commands::Close => cmd_close(config),
        Commands::Status { html } => cmd_status(config, html),
        Commands::Config { show } => cmd_config(&config, show),
    }
}

fn load_config(path: Option<&Path>) -> Result<IfcChatConfig, Box<dyn std::error::Error>> {
    // Explicit path (flag or IFC_CHAT_CONFIG_PATH) must exist
    if let Some(config_path) = path.filter(|p| !p.as_os_str().is_empty()) {
        return IfcChatConfig::load_from_file(config_path).map_err(Into::into);
    }

    Ok(IfcChatConfig::load_default())
}

fn cmd_flatten(
    config: &IfcChatConfig,
    file: &Path,
    class: Option<&str>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let class = class.unwrap_or(config.target_class.as_str());
    let records = services::flatten_file(file, class)?;
    let output = output.unwrap_or_else(|| config.model_data_path());
    services::write_records(&output, &records)?;
    println!(
        "Flattened {} {class} element(s) to {}",
        records.len(),
        output.display()
    );
    Ok(())
}

fn cmd_upload(config: IfcChatConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let service = ChatService::from_config(config)?;
    let summary = service.upload(file)?;
    println!(
        "Uploaded {} element(s) from {}",
        summary.record_count,
        file.display()
    );
    println!("  Model data: {}", summary.model_data_path.display());
    println!("  Assistant:  {}", summary.session.assistant_id);
    println!("  Thread:     {}", summary.session.thread_id);
    Ok(())
}

fn cmd_ask(
    config: IfcChatConfig,
    question: &str,
    output: Option<&Path>,
    live: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Input problems are reported before the API key is even looked at
    services::check_ask_ready(&config, question)?;
    let bridge = ConversationBridge::from_config(&config)?
        .with_event_sink(Arc::new(ConsoleSink { live }));
    let service = ChatService::new(config, bridge);
    let transcript = service.ask(question)?;
    if live {
        println!();
    }

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &transcript.html)?;
            println!(
                "Wrote transcript ({} fragment(s)) to {}",
                transcript.fragments.len(),
                path.display()
            );
        },
        None => print!("{}", transcript.html),
    }
    Ok(())
}

fn cmd_close(config: IfcChatConfig) -> Result<(), Box<dyn std::error::Error>> {
    let service = ChatService::from_config(config)?;
    match service.close()? {
        Some(handles) => println!("Closed session {handles}"),
        None => println!("No session stored"),
    }
    Ok(())
}

fn cmd_status(config: IfcChatConfig, html: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Status never talks to the service, so no API key is required.
    let bridge = ConversationBridge::new(
        Arc::new(ifc_chat::OpenAiAssistantClient::new()),
        Arc::new(ifc_chat::FileHandleStore::new(config.state_path())),
        BridgeSettings::from_config(&config),
    );
    let service = ChatService::new(config, bridge);
    let status = service.status()?;

    if html {
        print!("{}", rendering::render_sources(&status.sources()));
        return Ok(());
    }

    let config = service.config();
    println!("ifc-chat Status");
    println!("===============");
    println!("Data directory:    {}", config.data_dir.display());
    println!("Scratch directory: {}", config.scratch_dir.display());
    println!("Entity:            {}", config.entity);
    match status.record_count {
        Some(count) => println!(
            "Model data:        {} ({count} elements)",
            status.model_data_path.display()
        ),
        None => println!("Model data:        none (run `ifc-chat upload <file>`)"),
    }
    match status.session {
        Some(handles) => {
            println!("Assistant:         {}", handles.assistant_id);
            println!("Thread:            {}", handles.thread_id);
        },
        None => println!("Session:           not initialized"),
    }
    Ok(())
}

fn cmd_config(config: &IfcChatConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        print!("{}", config.describe());
    } else {
        println!("Config locations (first existing wins):");
        for path in IfcChatConfig::default_locations() {
            let marker = if path.exists() { "*" } else { " " };
            println!("  {marker} {}", path.display());
        }
        println!("Use --show to print the effective configuration.");
    }
    Ok(())
}

/// Prints live run output to the console.
struct ConsoleSink {
    live: bool,
}

impl RunEventSink for ConsoleSink {
    fn on_event(&self, event: &RunEvent) {
        tracing::debug!(?event, "Run event");
        if !self.live {
            return;
        }
        let mut out = std::io::stdout().lock();
        let _ = match event {
            RunEvent::TextCreated => write!(out, "\nassistant > "),
            RunEvent::TextDelta(text) | RunEvent::CodeInput(text) => write!(out, "{text}"),
            RunEvent::ToolCallCreated(kind) => writeln!(out, "\nassistant > {kind}"),
            RunEvent::CodeLogs(logs) => write!(out, "\n\noutput >\n{logs}\n"),
        };
        let _ = out.flush();
    }
}
