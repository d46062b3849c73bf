//! Facade crate for the osmload bulk loader.
//!
//! This crate re-exports the core domain types and the write session, and
//! exposes the PBF loader and SQLite sink behind the `store-sqlite` feature.

#![forbid(unsafe_code)]

pub use osmload_core::{
    BatchStart, ElementKind, Entity, EntityKind, InsertStatement, Metadata, Node, Relation,
    RelationMember, RelationalSink, SessionError, SinkConnection, SinkError, SqlValue, Tags, User,
    Way, WriteSession, encode_tags,
};

#[cfg(feature = "store-sqlite")]
pub use osmload_data::{
    ElementFilter, IngestDriver, LoadOptions, LoadReport, OsmLoadError, SqliteSink,
    SqliteSinkError, Thresholds, load_osm_pbf,
};
