//! Error types emitted by the osmload CLI.
//!
//! Keep this error type reasonably small, as every CLI helper returns
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osmload_data::{OsmLoadError, SqliteSinkError};
use thiserror::Error;

/// Errors emitted by the osmload CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist on disk or is not a file.
    #[error("{field} path {path:?} does not exist or is not a file")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// An `include` entry names no element kind.
    #[error("unknown element kind {value:?} in --{field} (expected node, way or relation)")]
    UnknownElementKind { field: &'static str, value: String },
    /// A threshold or capacity was set to zero.
    #[error("{field} must be greater than zero")]
    NonPositive { field: &'static str },
    /// Creating or bootstrapping the database failed.
    #[error("failed to prepare database at {path:?}: {source}")]
    PrepareDatabase {
        path: Utf8PathBuf,
        #[source]
        source: SqliteSinkError,
    },
    /// The load aborted.
    #[error("failed to load {path:?}: {source}")]
    Load {
        path: Utf8PathBuf,
        #[source]
        source: Box<OsmLoadError>,
    },
    /// The load finished but some flushes or commits failed.
    #[error("load of {path:?} finished with {failures} failed flushes or commits")]
    IncompleteLoad { path: Utf8PathBuf, failures: u64 },
    /// Building lookup indexes failed.
    #[error("failed to create indexes in {path:?}: {source}")]
    CreateIndexes {
        path: Utf8PathBuf,
        #[source]
        source: SqliteSinkError,
    },
}
