//! Positional parameter binding for each insert.
//!
//! Row layouts mirror [`InsertStatement::for_kind`](crate::InsertStatement::for_kind).

use log::warn;

use crate::{Metadata, Node, Relation, RelationMemberRow, SqlValue, Tags, Way, WayNodeRow, encode_tags};

/// Name stored for users whose name is missing.
pub const NO_NAME_FOUND: &str = "NO_NAME_FOUND";

pub(super) fn user_row(id: i64, name: &str) -> Vec<SqlValue> {
    let name = if name.is_empty() {
        warn!("User {id} has no name; storing {NO_NAME_FOUND}");
        NO_NAME_FOUND
    } else {
        name
    };
    vec![id.into(), name.into()]
}

pub(super) fn node_row(node: &Node) -> Vec<SqlValue> {
    let mut row = versioned(node.id, &node.metadata);
    row.push(node.location.into());
    row.push(tags_value(&node.tags));
    row
}

pub(super) fn way_row(way: &Way) -> Vec<SqlValue> {
    let mut row = versioned(way.id, &way.metadata);
    row.push(tags_value(&way.tags));
    row
}

pub(super) fn relation_row(relation: &Relation) -> Vec<SqlValue> {
    let mut row = versioned(relation.id, &relation.metadata);
    row.push(tags_value(&relation.tags));
    row
}

pub(super) fn way_node_row(row: WayNodeRow) -> Vec<SqlValue> {
    vec![row.way_id.into(), row.node_id.into(), row.sequence_id.into()]
}

pub(super) fn relation_member_row(row: RelationMemberRow<'_>) -> Vec<SqlValue> {
    vec![
        row.relation_id.into(),
        row.member_id.into(),
        row.member_kind.name().into(),
        row.role.into(),
        row.sequence_id.into(),
    ]
}

// id, version, user_id, tstamp, changeset_id
fn versioned(id: i64, metadata: &Metadata) -> Vec<SqlValue> {
    vec![
        id.into(),
        metadata.version.into(),
        metadata.user.id.into(),
        metadata.timestamp_millis.into(),
        metadata.changeset_id.into(),
    ]
}

fn tags_value(tags: &Tags) -> SqlValue {
    SqlValue::Text(encode_tags(tags))
}
