//! Command-line interface for the osmload bulk loader.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use log::{info, warn};
use osmload_data::{LoadReport, SqliteSink, load_osm_pbf};

mod config;
mod error;

pub use error::CliError;

use config::{LoadArgs, LoadConfig};

/// Run the osmload CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Load(args) => {
            let config = resolve_load_config(args)?;
            run_load(&config)?;
        }
    }
    Ok(())
}

fn resolve_load_config(args: LoadArgs) -> Result<LoadConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

fn run_load(config: &LoadConfig) -> Result<LoadReport, CliError> {
    let sink = SqliteSink::create(&config.database).map_err(|source| {
        CliError::PrepareDatabase {
            path: config.database.clone(),
            source,
        }
    })?;

    let report = load_osm_pbf(config.osm_pbf.as_std_path(), sink.clone(), &config.options)
        .map_err(|source| CliError::Load {
            path: config.osm_pbf.clone(),
            source: Box::new(source),
        })?;

    if !report.is_complete() {
        return Err(CliError::IncompleteLoad {
            path: config.osm_pbf.clone(),
            failures: report.total_failed_flushes() + report.failed_commits(),
        });
    }

    if config.skip_indexes {
        warn!("Skipping index creation for {}", config.database);
    } else {
        info!("Creating indexes in {}", config.database);
        sink.create_indexes()
            .map_err(|source| CliError::CreateIndexes {
                path: config.database.clone(),
                source,
            })?;
    }
    Ok(report)
}

#[derive(Debug, Parser)]
#[command(
    name = "osmload",
    about = "Bulk-load OpenStreetMap extracts into a relational store",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream a PBF file into a SQLite database.
    Load(LoadArgs),
}

#[cfg(test)]
mod tests;
