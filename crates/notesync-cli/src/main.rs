//! notesync CLI
//!
//! Command-line interface for notesync - notes over a local document store.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use notesync_core::{Config, FileDocumentStore, NoteRepository, NoteViewModel};

mod commands;
mod editor;
mod logging;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "notesync")]
#[command(about = "notesync - Reactive notes over a document store")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new note
    #[command(alias = "create")]
    Add {
        /// Note title
        #[arg(short = 'T', long)]
        title: String,
        /// Note description (opens editor if not provided)
        #[arg(short, long)]
        description: Option<String>,
        /// Colour index into the palette (random if not provided)
        #[arg(short, long)]
        color: Option<u8>,
    },
    /// List all notes
    #[command(alias = "ls")]
    List,
    /// Show note details
    Show {
        /// Note ID (full ID or prefix)
        id: String,
    },
    /// Edit a note
    Edit {
        /// Note ID (full ID or prefix)
        id: String,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
        /// New colour index
        #[arg(short, long)]
        color: Option<u8>,
    },
    /// Delete a note
    #[command(alias = "rm")]
    Delete {
        /// Note ID (full ID or prefix)
        id: String,
    },
    /// Print note list changes and operation results until Ctrl-C
    Watch,
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let config = Config::load().context("Failed to load configuration")?;
    logging::init(&config);

    match cli.command {
        Commands::Config { command } => handle_config_command(command, &config, &output),
        Commands::Add {
            title,
            description,
            color,
        } => {
            let view_model = open_view_model(&config)?;
            commands::note::add(&view_model, title, description, color, &output).await
        }
        Commands::List => {
            let view_model = open_view_model(&config)?;
            commands::note::list(&view_model, &output).await
        }
        Commands::Show { id } => {
            let view_model = open_view_model(&config)?;
            commands::note::show(&view_model, id, &output).await
        }
        Commands::Edit {
            id,
            title,
            description,
            color,
        } => {
            let mut view_model = open_view_model(&config)?;
            let changes = commands::note::NoteChanges {
                title,
                description,
                color,
            };
            commands::note::edit(&mut view_model, id, changes, &output).await
        }
        Commands::Delete { id } => {
            let view_model = open_view_model(&config)?;
            commands::note::delete(&view_model, id, &output).await
        }
        Commands::Watch => {
            let view_model = open_view_model(&config)?;
            commands::watch::run(&view_model, &output).await
        }
    }
}

fn open_view_model(config: &Config) -> Result<NoteViewModel> {
    let store = FileDocumentStore::open(config)
        .with_context(|| format!("Failed to open notes store at {:?}", config.notes_path()))?;
    let repository = NoteRepository::new(Arc::new(store));
    Ok(NoteViewModel::new(repository, &config.view_model()))
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config, output),
    }
}
