//! Data access and ingestion for the osmload bulk loader.
//!
//! Responsibilities:
//! - Decode OSM PBF files into owned entities on a producer thread.
//! - Buffer entities per kind and drive the write session through its flush
//!   and commit thresholds.
//! - Provide the SQLite adapter for the relational sink port.
//!
//! Boundaries:
//! - Entity types and the session state machine live in `osmload-core`.
//! - No argument parsing or logger installation (see `osmload-cli`).
//!
//! Invariants:
//! - Exactly one thread writes to the sink.
//! - No global mutable state.

pub mod ingest;
pub mod sqlite;

pub use ingest::{
    CommitCause, CommitCounters, CounterReset, ElementFilter, EntityAccumulator, FlushOutcome,
    IngestDriver, LoadOptions, LoadReport, OsmLoadError, Thresholds, load_osm_pbf,
};
pub use sqlite::{SqliteConnection, SqliteSink, SqliteSinkError};
