//! trestle command-line tool.
//!
//! Provides the `trestle` binary for inspecting and editing a trestle triple
//! store. Terms are given in N-Triples syntax: `<http://...>`, `_:label`,
//! `"text"`, `"text"@en` or `"5"^^<http://...#integer>`.
//!
//! The database path comes from `--db`, falling back to `TRESTLE_DB_PATH`
//! (see `StoreConfig::from_env`).
//!
//! Exit codes: 0 = success, 1 = usage or term syntax error, 3 = storage error.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use trestle_core::{CoreError, Node, Triple};
use trestle_storage::{GraphStore, SqliteStore, StorageError, StoreConfig};

/// Inspect and edit a trestle triple store.
#[derive(Parser)]
#[command(name = "trestle", about = "Inspect and edit a trestle triple store")]
struct Cli {
    /// Path to the store database file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Writes per background batch.
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// List stored graphs as a JSON array (`null` is the default graph).
    List,

    /// Print a graph's prefixes and triples.
    Show {
        /// Graph URI (default graph if omitted).
        #[arg(short, long)]
        graph: Option<String>,
    },

    /// Add one triple to a graph.
    Add {
        #[arg(short, long)]
        graph: Option<String>,
        subject: String,
        predicate: String,
        object: String,
    },

    /// Remove one triple from a graph.
    Remove {
        #[arg(short, long)]
        graph: Option<String>,
        subject: String,
        predicate: String,
        object: String,
    },

    /// Delete a graph.
    Delete {
        #[arg(short, long)]
        graph: Option<String>,
    },

    /// Remove every triple and prefix from a graph, keeping the graph.
    Clear {
        #[arg(short, long)]
        graph: Option<String>,
    },

    /// Print row counts as JSON.
    Stats,
}

/// Failure of a subcommand, mapped to an exit code.
enum CliError {
    Usage(String),
    Storage(StorageError),
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Core(core) => CliError::Usage(core.to_string()),
            other => CliError::Storage(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        CliError::Usage(e.to_string())
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not errors.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(CliError::Usage(msg)) => {
            eprintln!("Error: {}", msg);
            1
        }
        Err(CliError::Storage(e)) => {
            eprintln!("Error: {}", e);
            3
        }
    };
    process::exit(exit_code);
}

fn open_store(cli: &Cli) -> Result<SqliteStore, CliError> {
    let mut config = match &cli.db {
        Some(path) => StoreConfig::new(path.clone()),
        None => StoreConfig::from_env()?,
    };
    if let Some(batch_size) = cli.batch_size {
        config = config.with_batch_size(batch_size);
    }
    config
        .validate()
        .map_err(|e| CliError::Usage(e.to_string()))?;
    Ok(SqliteStore::open(config)?)
}

fn parse_triple(subject: &str, predicate: &str, object: &str) -> Result<Triple, CliError> {
    Ok(Triple::new(
        subject.parse::<Node>()?,
        predicate.parse::<Node>()?,
        object.parse::<Node>()?,
    ))
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e))
}

fn run(cli: Cli) -> Result<(), CliError> {
    // Validate term syntax before touching the database.
    let triple = match &cli.command {
        Commands::Add {
            subject,
            predicate,
            object,
            ..
        }
        | Commands::Remove {
            subject,
            predicate,
            object,
            ..
        } => Some(parse_triple(subject, predicate, object)?),
        _ => None,
    };

    let store = open_store(&cli)?;

    match (&cli.command, triple) {
        (Commands::List, _) => {
            println!("{}", to_json(&store.list_graphs()?));
        }
        (Commands::Show { graph }, _) => {
            let Some(loaded) = store.load_graph(graph.as_deref())? else {
                return Err(CliError::Usage(format!(
                    "no graph named {}",
                    graph.as_deref().unwrap_or("(default)")
                )));
            };
            for (prefix, uri) in loaded.namespaces().iter() {
                println!("@prefix {}: <{}> .", prefix, uri);
            }
            for triple in loaded.triples() {
                println!("{}", triple);
            }
        }
        (Commands::Add { graph, .. }, Some(triple)) => {
            store.update_graph(graph.as_deref(), &[triple], &[])?;
        }
        (Commands::Remove { graph, .. }, Some(triple)) => {
            store.update_graph(graph.as_deref(), &[], &[triple])?;
        }
        (Commands::Delete { graph }, _) => {
            store.delete_graph(graph.as_deref())?;
        }
        (Commands::Clear { graph }, _) => {
            let mut session = store.session();
            session.open(false)?;
            let found = store.find_graph(&session, graph.as_deref())?;
            if let Some(id) = found {
                store.clear_graph(&session, id)?;
            }
            session.close(true)?;
        }
        (Commands::Stats, _) => {
            let mut session = store.session();
            session.open(false)?;
            let stats = store.stats(&session)?;
            session.close(true)?;
            println!("{}", to_json(&stats));
        }
        (Commands::Add { .. } | Commands::Remove { .. }, None) => {
            return Err(CliError::Usage("missing triple".into()));
        }
    }

    store.close()?;
    Ok(())
}
