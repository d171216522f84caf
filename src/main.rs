//! # Parcel Notes CLI (`parcel-notes`)
//!
//! Starts the HTTP backend and offers a few offline maintenance commands
//! that work directly against the notes file.
//!
//! ## Usage
//!
//! ```bash
//! parcel-notes --config ./config/parcel-notes.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parcel-notes init` | Create the data directory and an empty notes file |
//! | `parcel-notes serve` | Start the HTTP server |
//! | `parcel-notes notes list` | Print all notes as JSON |
//! | `parcel-notes notes set <cadastral>` | Create or update a note |
//! | `parcel-notes prompt <record.json>` | Print the AI prompt for a record |
//!
//! YandexGPT credentials are read from `YANDEX_GPT_API_KEY`,
//! `YANDEX_GPT_MODEL_URI`, `YANDEX_GPT_SYSTEM_PROMPT`, and
//! `YANDEX_GPT_FOLDER_ID`; a `.env` file in the working directory is loaded
//! first if present.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use parcel_notes::config::{self, Config};
use parcel_notes::notes::{JsonFileStore, NoteStore, NoteUpdate};
use parcel_notes::prompt::build_prompt;
use parcel_notes::server;

/// Parcel Notes — notes, map lookups, and AI-drafted listings for land parcels.
#[derive(Parser)]
#[command(
    name = "parcel-notes",
    about = "Parcel Notes — a local backend for land-parcel notes, map lookups, and AI-drafted listings",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional: when the file does not exist, built-in defaults are used
    /// (bind `0.0.0.0:8080`, data in `./data`, front-end in `./public`).
    #[arg(long, global = true, default_value = "./config/parcel-notes.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and an empty notes file.
    ///
    /// Idempotent: an existing notes file is left untouched.
    Init,

    /// Start the HTTP server.
    Serve {
        /// Override `[server].bind` (e.g. `127.0.0.1:8080`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Inspect or edit notes without running the server.
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },

    /// Print the prompt that would be sent to the language model.
    ///
    /// Reads a land-parcel record (a JSON object) from the given file.
    Prompt {
        /// Path to a JSON file containing the record object.
        record: PathBuf,

        /// Manager instruction to append.
        #[arg(long)]
        instruction: Option<String>,

        /// Existing draft to append.
        #[arg(long)]
        existing_note: Option<String>,
    },
}

#[derive(Subcommand)]
enum NotesAction {
    /// Print every stored note as pretty JSON.
    List,

    /// Create or update a note. Omitted fields keep their stored value.
    Set {
        /// Cadastral number of the parcel.
        cadastral_number: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        avito_link: Option<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = JsonFileStore::new(cfg.storage.notes_path());
            store.ensure_data_file().await?;
            println!("Notes file ready at {}", store.path().display());
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
        Commands::Notes { action } => run_notes(&cfg, action).await?,
        Commands::Prompt {
            record,
            instruction,
            existing_note,
        } => {
            let content = std::fs::read_to_string(&record)
                .with_context(|| format!("Failed to read record file: {}", record.display()))?;
            let value: serde_json::Value =
                serde_json::from_str(&content).with_context(|| "Record file is not valid JSON")?;
            let record = value
                .as_object()
                .ok_or_else(|| anyhow::anyhow!("Record file must contain a JSON object"))?;

            let instruction = instruction.map(serde_json::Value::String);
            let existing_note = existing_note.map(serde_json::Value::String);
            println!(
                "{}",
                build_prompt(record, existing_note.as_ref(), instruction.as_ref())
            );
        }
    }

    Ok(())
}

async fn run_notes(cfg: &Config, action: NotesAction) -> anyhow::Result<()> {
    let store = JsonFileStore::new(cfg.storage.notes_path());
    match action {
        NotesAction::List => {
            let notes = store.get_all().await?;
            println!("{}", serde_json::to_string_pretty(&notes)?);
        }
        NotesAction::Set {
            cadastral_number,
            description,
            avito_link,
        } => {
            let record = store
                .upsert(
                    &cadastral_number,
                    NoteUpdate {
                        description,
                        avito_link,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    Ok(())
}
