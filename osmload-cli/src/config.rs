//! Layered configuration for the `load` subcommand.

use std::num::NonZeroUsize;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmload_core::ElementKind;
use osmload_data::{ElementFilter, LoadOptions, Thresholds};
use serde::{Deserialize, Serialize};

use crate::CliError;

pub(crate) const ARG_OSM_PBF: &str = "osm-pbf";
pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_INCLUDE: &str = "include";
pub(crate) const ARG_ROW_THRESHOLD: &str = "row-threshold";
pub(crate) const ARG_COMMIT_THRESHOLD: &str = "commit-threshold";
pub(crate) const ARG_MEMBER_COMMIT_THRESHOLD: &str = "member-commit-threshold";
pub(crate) const ARG_CHANNEL_CAPACITY: &str = "channel-capacity";
pub(crate) const ENV_OSM_PBF: &str = "OSMLOAD_CMDS_LOAD_OSM_PBF";
pub(crate) const ENV_DATABASE: &str = "OSMLOAD_CMDS_LOAD_DATABASE";

/// CLI arguments for the `load` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Stream an OpenStreetMap PBF extract into a SQLite database. \
                 Options can come from CLI flags, configuration files, or \
                 environment variables.",
    about = "Load an OSM PBF file into SQLite"
)]
#[ortho_config(prefix = "OSMLOAD")]
pub(crate) struct LoadArgs {
    /// Path to the OpenStreetMap PBF file.
    #[arg(long = ARG_OSM_PBF, value_name = "path")]
    #[serde(default)]
    pub(crate) osm_pbf: Option<Utf8PathBuf>,
    /// Path to the SQLite database to create or extend.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Element kinds to load (node, way, relation). Defaults to all.
    #[arg(long = ARG_INCLUDE, value_name = "kind", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) include: Option<Vec<String>>,
    /// Buffered entries per kind before a flush.
    #[arg(long = ARG_ROW_THRESHOLD, value_name = "rows")]
    #[serde(default)]
    pub(crate) row_threshold: Option<usize>,
    /// Rows since the last commit before a commit.
    #[arg(long = ARG_COMMIT_THRESHOLD, value_name = "rows")]
    #[serde(default)]
    pub(crate) commit_threshold: Option<usize>,
    /// Parents since the last commit before a commit, for way nodes and
    /// relation members. Defaults to five times the row threshold.
    #[arg(long = ARG_MEMBER_COMMIT_THRESHOLD, value_name = "parents")]
    #[serde(default)]
    pub(crate) member_commit_threshold: Option<usize>,
    /// Decoded entities buffered ahead of the writer.
    #[arg(long = ARG_CHANNEL_CAPACITY, value_name = "entities")]
    #[serde(default)]
    pub(crate) channel_capacity: Option<usize>,
    /// Skip building lookup indexes after the load.
    #[arg(long)]
    #[serde(default)]
    pub(crate) skip_indexes: bool,
}

impl LoadArgs {
    pub(crate) fn into_config(self) -> Result<LoadConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        LoadConfig::try_from(merged)
    }
}

/// Validated settings for one load run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadConfig {
    pub(crate) osm_pbf: Utf8PathBuf,
    pub(crate) database: Utf8PathBuf,
    pub(crate) options: LoadOptions,
    pub(crate) skip_indexes: bool,
}

impl LoadConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.osm_pbf, ARG_OSM_PBF)
    }
}

impl TryFrom<LoadArgs> for LoadConfig {
    type Error = CliError;

    fn try_from(args: LoadArgs) -> Result<Self, Self::Error> {
        let osm_pbf = args.osm_pbf.ok_or(CliError::MissingArgument {
            field: ARG_OSM_PBF,
            env: ENV_OSM_PBF,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_DATABASE,
        })?;

        let row = positive_or(args.row_threshold, ARG_ROW_THRESHOLD, Thresholds::DEFAULT_ROW)?;
        let commit = positive_or(
            args.commit_threshold,
            ARG_COMMIT_THRESHOLD,
            Thresholds::DEFAULT_COMMIT,
        )?;
        let mut thresholds = Thresholds::new(row, commit);
        if let Some(member_commit) = args.member_commit_threshold {
            let value = positive(member_commit, ARG_MEMBER_COMMIT_THRESHOLD)?;
            thresholds = thresholds.with_member_commit(value);
        }
        let channel_capacity = positive_or(
            args.channel_capacity,
            ARG_CHANNEL_CAPACITY,
            LoadOptions::DEFAULT_CHANNEL_CAPACITY,
        )?;

        let filter = match args.include {
            Some(kinds) => ElementFilter::only(parse_kinds(&kinds)?),
            None => ElementFilter::all(),
        };

        Ok(Self {
            osm_pbf,
            database,
            options: LoadOptions::default()
                .with_thresholds(thresholds)
                .with_filter(filter)
                .with_channel_capacity(channel_capacity),
            skip_indexes: args.skip_indexes,
        })
    }
}

fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        })
    }
}

fn positive(value: usize, field: &'static str) -> Result<usize, CliError> {
    NonZeroUsize::new(value)
        .map(NonZeroUsize::get)
        .ok_or(CliError::NonPositive { field })
}

fn positive_or(value: Option<usize>, field: &'static str, default: usize) -> Result<usize, CliError> {
    value.map_or(Ok(default), |set| positive(set, field))
}

pub(crate) fn parse_kinds(values: &[String]) -> Result<Vec<ElementKind>, CliError> {
    values
        .iter()
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(parse_kind)
        .collect()
}

fn parse_kind(value: &str) -> Result<ElementKind, CliError> {
    ElementKind::ALL
        .into_iter()
        .find(|kind| kind.name().eq_ignore_ascii_case(value))
        .ok_or_else(|| CliError::UnknownElementKind {
            field: ARG_INCLUDE,
            value: value.to_owned(),
        })
}
