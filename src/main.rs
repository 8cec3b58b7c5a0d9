use std::{io, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::{Config, ConfigError};
use import::{ImportError, Importer};
use log::{error, info, warn, LevelFilter};
use thiserror::Error;
use yamdb_collab::{
    ArcedDatabase, ArcedMailer, AuthError, Collab, CollabConfig, DatabaseError, LogMailer,
    MemoryDatabase, PgDatabase, RelayMailer,
};

mod config;
mod import;
mod logging;

/// A review aggregation API.
#[derive(Parser, Debug)]
#[command(name = "yamdb", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the API server. This is what runs without a command.
    Serve,
    /// Load users, the catalog, reviews and comments from a directory of CSV files.
    Import {
        /// Directory with users.csv, category.csv, genre.csv, genre_title.csv,
        /// titles.csv, review.csv and comments.csv. Missing files are left out.
        dir: PathBuf,
    },
}

#[derive(Debug, Error)]
enum YamdbError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Could not register the superuser: {0}")]
    Superuser(#[from] AuthError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Server stopped: {0}")]
    Server(#[from] io::Error),
}

impl YamdbError {
    fn hint(&self) -> String {
        match self {
            YamdbError::Config(e) => format!("Check the value of {} in the environment, or unset it to use the default.", e.name),
            YamdbError::Database(_) => "This is a database error. Make sure DATABASE_URL points to a running Postgres instance, then try again.".to_string(),
            YamdbError::Superuser(_) => "Check YAMDB_SUPERUSER_EMAIL. If the database is fine, the address may be taken by another account.".to_string(),
            YamdbError::Import(_) => "Files before the failing one were already imported. Fix the file, then import into an empty database.".to_string(),
            YamdbError::Server(_) => "Make sure the port is not already in use, or set YAMDB_SERVER_PORT to another one.".to_string(),
        }
    }
}

async fn connect(config: &Config) -> Result<ArcedDatabase, YamdbError> {
    match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            Ok(Arc::new(PgDatabase::new(url).await?))
        }
        None => {
            warn!("DATABASE_URL is not set, all data is kept in memory and lost on exit.");
            Ok(Arc::new(MemoryDatabase::new()))
        }
    }
}

async fn serve(config: Config) -> Result<(), YamdbError> {
    let database = connect(&config).await?;

    let mailer: ArcedMailer = match config.mail_relay.clone() {
        Some(endpoint) => Arc::new(RelayMailer::new(endpoint, config.mail_from.clone())),
        None => {
            warn!("YAMDB_MAIL_RELAY_URL is not set, confirmation codes are only logged.");
            Arc::new(LogMailer::new(config.mail_from.clone()))
        }
    };

    let collab = Collab::new(
        database,
        mailer,
        CollabConfig {
            challenge_ttl: config.challenge_ttl,
        },
    );

    if let Some(email) = &config.superuser_email {
        collab.auth.register_superuser(email).await?;
    }

    info!("Initialized successfully.");
    yamdb_server::run_server(Arc::new(collab), config.port).await?;

    Ok(())
}

async fn run_import(config: Config, dir: PathBuf) -> Result<(), YamdbError> {
    if config.database_url.is_none() {
        warn!("Importing into memory only checks the files, nothing is kept.");
    }

    let database = connect(&config).await?;
    let summary = Importer::new(database).import_dir(&dir).await?;

    info!(
        "Import from {} finished: {} rows imported, {} skipped.",
        dir.display(),
        summary.imported,
        summary.skipped
    );

    Ok(())
}

async fn run(cli: Cli, config: Result<Config, ConfigError>) -> Result<(), YamdbError> {
    let config = config?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Import { dir } => run_import(config, dir).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::from_env();

    // An invalid configuration is still reported through the logger
    let level = config
        .as_ref()
        .map(|c| c.log_level)
        .unwrap_or(LevelFilter::Info);

    if let Err(e) = logging::init_logger(level) {
        eprintln!("Could not initialize logging: {e}");
        return;
    }

    if let Err(error) = run(cli, config).await {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "yamdb failed!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
    }
}
