pub mod error;
pub mod id;
pub mod model;
pub mod search;
pub mod smoke;
pub mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use id::ChecksumIdGenerator;
use model::types::{Date, Entity, Office, Patient, TypeAttributes};
use smoke::SmokeOptions;
use std::path::PathBuf;
use storage::sqlite::SqliteStorer;
use storage::{Parameters, Storer, MAX_SEARCH_LIMIT};
use tracing_subscriber::EnvFilter;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "edir",
    version,
    about = "Typed-entity directory with fuzzy fan-out search"
)]
pub struct Cli {
    /// Path to the SQLite database (defaults to platform data dir)
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update an entity
    Put {
        #[command(subcommand)]
        entity: PutCommand,
    },
    /// Fetch an entity by ID
    Get {
        entity_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fuzzy-search entities
    Search {
        /// The query string (4..=32 characters)
        query: String,

        /// Max results (1..=8)
        #[arg(long, default_value_t = MAX_SEARCH_LIMIT)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Put random entities, then search for them (local workload)
    Smoke {
        /// Number of entities to put
        #[arg(long, default_value_t = 32)]
        entities: usize,

        /// Number of searches to run
        #[arg(long, default_value_t = 16)]
        searches: usize,

        /// RNG seed for reproducible runs
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum PutCommand {
    /// Person record
    Patient {
        /// Existing entity ID (updates in place)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        last_name: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        middle_name: Option<String>,

        #[arg(long)]
        suffix: Option<String>,

        /// Birthdate as YYYY-MM-DD
        #[arg(long)]
        birthdate: String,
    },
    /// Organization record
    Office {
        /// Existing entity ID (updates in place)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        name: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Log to stderr; stdout is reserved for command output.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .init();

    let db_path = cli.db.unwrap_or_else(default_db_path);
    let storer = SqliteStorer::open(
        &db_path,
        ChecksumIdGenerator::new(),
        Parameters::from_env(),
    )?;

    match cli.command {
        Commands::Put { entity } => {
            let entity = entity_from_args(entity)?;
            let entity_id = storer.put_entity(&entity)?;
            println!("{entity_id}");
        }
        Commands::Get { entity_id, json } => {
            let entity = storer.get_entity(&entity_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entity)?);
            } else {
                print_entity(&entity);
            }
        }
        Commands::Search { query, limit, json } => {
            let hits = storer.search_entity(&query, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                if hits.is_empty() {
                    eprintln!("No results found.");
                }
                for hit in &hits {
                    print_entity(hit);
                }
            }
        }
        Commands::Smoke {
            entities,
            searches,
            seed,
        } => {
            let opts = SmokeOptions {
                entities,
                searches,
                seed,
            };
            smoke::run_smoke(&storer, &opts)?;
            println!("smoke ok: {entities} entities, {searches} searches");
        }
    }

    Ok(())
}

fn entity_from_args(cmd: PutCommand) -> Result<Entity> {
    match cmd {
        PutCommand::Patient {
            id,
            last_name,
            first_name,
            middle_name,
            suffix,
            birthdate,
        } => {
            let birthdate = Date::from_iso8601(&birthdate)?;
            Ok(Entity::patient(
                id.unwrap_or_default(),
                Patient {
                    last_name,
                    first_name,
                    middle_name,
                    suffix,
                    birthdate: Some(birthdate),
                },
            ))
        }
        PutCommand::Office { id, name } => {
            Ok(Entity::office(id.unwrap_or_default(), Office { name }))
        }
    }
}

fn print_entity(entity: &Entity) {
    match &entity.attributes {
        TypeAttributes::Patient(p) => {
            let birthdate = p
                .birthdate
                .as_ref()
                .map(Date::iso8601)
                .unwrap_or_default();
            println!(
                "{} | Patient | {}, {} | {}",
                entity.entity_id, p.last_name, p.first_name, birthdate
            );
        }
        TypeAttributes::Office(f) => {
            println!("{} | Office | {}", entity.entity_id, f.name);
        }
    }
}

pub fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("org", "entity-directory", "entity-directory")
        .expect("project dirs available")
        .data_dir()
        .join("directory.db")
}
