//! Core domain types for the osmload bulk loader.
//!
//! Responsibilities:
//! - Model the OpenStreetMap entities carried through the load pipeline.
//! - Encode tag mappings into the JSON column format.
//! - Define the relational sink port and the single-writer session that
//!   serializes batched inserts against it.
//!
//! Boundaries:
//! - No file decoding or database drivers live here (see `osmload-data`).
//!
//! Invariants:
//! - At most one connection and one prepared statement are live per
//!   [`WriteSession`].
//! - No global mutable state.

pub mod entity;
pub mod session;
pub mod sink;
pub mod tags;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use entity::{
    ElementKind, Entity, EntityKind, Metadata, Node, Relation, RelationMember,
    RelationMemberRow, Tags, USER_ID_NONE, User, Way, WayNodeRow,
};
pub use session::{BatchStart, SessionError, WriteSession};
pub use sink::{InsertStatement, RelationalSink, SinkConnection, SinkError, SqlValue};
pub use tags::encode_tags;
