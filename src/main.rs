//! Rowbridge CLI - operational tooling for the relational store

use clap::{Parser, Subcommand};
use rowbridge::config;
use rowbridge::migrate::MigrationEngine;
use rowbridge::store::Store;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rowbridge")]
#[command(version = "0.1.0")]
#[command(about = "Relational data bridge - store setup and schema inspection")]
#[command(long_about = r#"
Rowbridge keeps a SQLite store and its schema version in lockstep:
  • Migrations run at process start, before anything serves requests
  • Encoders and decoders exchange rows through a generic Node model

Example usage:
  rowbridge init --path .
  rowbridge status --database .rowbridge/data.db
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store, stamp its schema version, and write the config
    Init {
        /// Project root to initialize in
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Path to the database file (defaults to .rowbridge/data.db)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show the persisted schema version and relation list
    Status {
        /// Path to the database file (defaults to the configured one)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { path, database, force } => {
            let database = database.unwrap_or_else(|| config::default_database_path_in(&path));
            let staging = config::default_staging_path_in(&path);

            let cfg = config::RowbridgeConfig {
                database: Some(database.to_string_lossy().into_owned()),
                staging: Some(staging.to_string_lossy().into_owned()),
            };
            config::write_config(&path.join(config::default_config_path()), &cfg, force)?;
            config::ensure_db_dir(&database)?;
            config::ensure_gitignore(&path)?;

            let store = Store::open(&database)?;
            let outcome = MigrationEngine::new().run(&store)?;
            tracing::info!(?outcome, "Store initialized");
            println!("Initialized store at {:?}", database);
        }

        Commands::Status { database, json } => {
            let database = match database {
                Some(database) => database,
                None => resolve_database()?,
            };
            if !database.exists() {
                anyhow::bail!("no database at {:?} (run `rowbridge init` first)", database);
            }

            let store = Store::open(&database)?;
            let version = store.schema_version()?;
            let relations = store.relation_names()?;

            if json {
                let status = serde_json::json!({
                    "database": database,
                    "schema_version": version,
                    "relations": relations,
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                match version {
                    Some(version) => println!("Schema version: {}", version),
                    None => println!("Schema version: not stamped"),
                }
                println!("Relations ({}):", relations.len());
                for name in relations {
                    println!("  {}", name);
                }
            }
        }
    }

    Ok(())
}

/// Find the database path from the config in the current directory
fn resolve_database() -> anyhow::Result<PathBuf> {
    let config = config::load_config(None)?;
    let database = config
        .and_then(|c| c.database)
        .map(PathBuf::from)
        .unwrap_or_else(|| config::default_database_path_in(std::path::Path::new(".")));
    Ok(database)
}
