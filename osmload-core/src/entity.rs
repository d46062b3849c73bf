//! OpenStreetMap entities as they flow from the decoder into the sink.
//!
//! Entities are immutable once read. Ways and relations carry their member
//! lists inline; [`Way::node_rows`] and [`Relation::member_rows`] expand them
//! into the side-table rows persisted alongside the parent.

use std::collections::BTreeMap;
use std::fmt;

use geo::Point;

/// Free-form OSM key/value tags.
///
/// A `BTreeMap` keeps keys unique and iteration order deterministic, which
/// makes the encoded JSON column stable across runs.
pub type Tags = BTreeMap<String, String>;

/// User id recorded when the source omits the author.
pub const USER_ID_NONE: i64 = -1;

/// Kind of element produced by the upstream decoder.
///
/// The same three kinds describe relation members, and their
/// [`name`](Self::name) is what lands in `relation_members.member_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    /// A point node.
    Node,
    /// An ordered list of node references.
    Way,
    /// A grouping of nodes, ways and other relations.
    Relation,
}

impl ElementKind {
    /// All element kinds in stream order.
    pub const ALL: [Self; 3] = [Self::Node, Self::Way, Self::Relation];

    /// Persisted name of the kind.
    ///
    /// # Examples
    /// ```
    /// use osmload_core::ElementKind;
    ///
    /// assert_eq!(ElementKind::Way.name(), "Way");
    /// ```
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::Way => "Way",
            Self::Relation => "Relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of row written through a [`WriteSession`](crate::WriteSession).
///
/// Each variant owns one table and one insert statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// `users` rows.
    User,
    /// `nodes` rows.
    Node,
    /// `ways` rows.
    Way,
    /// `way_nodes` rows.
    WayNode,
    /// `relations` rows.
    Relation,
    /// `relation_members` rows.
    RelationMember,
}

impl EntityKind {
    /// All entity kinds in referential flush order.
    pub const ALL: [Self; 6] = [
        Self::User,
        Self::Node,
        Self::Way,
        Self::WayNode,
        Self::Relation,
        Self::RelationMember,
    ];

    /// Human-readable label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Node => "nodes",
            Self::Way => "ways",
            Self::WayNode => "way nodes",
            Self::Relation => "relations",
            Self::RelationMember => "relation members",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Author of an entity version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// OSM user id, or [`USER_ID_NONE`] when unknown.
    pub id: i64,
    /// Display name. Empty when the source carries none.
    pub name: String,
}

impl User {
    /// Construct a user.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Placeholder author for entities without user information.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            id: USER_ID_NONE,
            name: String::new(),
        }
    }
}

/// Versioning fields shared by nodes, ways and relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Entity version.
    pub version: i32,
    /// Author of this version.
    pub user: User,
    /// Edit time as milliseconds since the Unix epoch, if known.
    pub timestamp_millis: Option<i64>,
    /// Changeset that introduced this version.
    pub changeset_id: i64,
}

impl Metadata {
    /// Construct metadata for an entity version.
    #[must_use]
    pub const fn new(
        version: i32,
        user: User,
        timestamp_millis: Option<i64>,
        changeset_id: i64,
    ) -> Self {
        Self {
            version,
            user,
            timestamp_millis,
            changeset_id,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(0, User::unknown(), None, 0)
    }
}

/// A point node. `location` uses WGS84 with `x = longitude`, `y = latitude`.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node id.
    pub id: i64,
    /// Version metadata.
    pub metadata: Metadata,
    /// Position of the node.
    pub location: Point<f64>,
    /// Node tags.
    pub tags: Tags,
}

/// An ordered list of node references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Way {
    /// Way id.
    pub id: i64,
    /// Version metadata.
    pub metadata: Metadata,
    /// Way tags.
    pub tags: Tags,
    /// Member node ids in source order.
    pub node_refs: Vec<i64>,
}

/// One member of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMember {
    /// Id of the referenced element.
    pub member_id: i64,
    /// Kind of the referenced element.
    pub member_kind: ElementKind,
    /// Role of the member within the relation. May be empty.
    pub role: String,
}

impl RelationMember {
    /// Construct a relation member.
    pub fn new(member_id: i64, member_kind: ElementKind, role: impl Into<String>) -> Self {
        Self {
            member_id,
            member_kind,
            role: role.into(),
        }
    }
}

/// A grouping of other elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Relation id.
    pub id: i64,
    /// Version metadata.
    pub metadata: Metadata,
    /// Relation tags.
    pub tags: Tags,
    /// Members in source order.
    pub members: Vec<RelationMember>,
}

/// A decoded element handed from the producer to the ingest driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// A point node.
    Node(Node),
    /// A way.
    Way(Way),
    /// A relation.
    Relation(Relation),
}

impl Entity {
    /// Kind of the wrapped element.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Node(_) => ElementKind::Node,
            Self::Way(_) => ElementKind::Way,
            Self::Relation(_) => ElementKind::Relation,
        }
    }
}

/// A `way_nodes` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WayNodeRow {
    /// Parent way.
    pub way_id: i64,
    /// Referenced node.
    pub node_id: i64,
    /// Zero-based position within the way.
    pub sequence_id: i64,
}

/// A `relation_members` row borrowing its role from the parent relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationMemberRow<'a> {
    /// Parent relation.
    pub relation_id: i64,
    /// Referenced element.
    pub member_id: i64,
    /// Kind of the referenced element.
    pub member_kind: ElementKind,
    /// Member role.
    pub role: &'a str,
    /// Zero-based position within the relation.
    pub sequence_id: i64,
}

/// Expand a way's node references into rows numbered from zero.
///
/// # Examples
/// ```
/// use osmload_core::entity::way_node_rows;
///
/// let sequence: Vec<i64> = way_node_rows(1, &[10, 20]).map(|row| row.sequence_id).collect();
/// assert_eq!(sequence, vec![0, 1]);
/// ```
pub fn way_node_rows(way_id: i64, node_refs: &[i64]) -> impl Iterator<Item = WayNodeRow> + '_ {
    (0_i64..)
        .zip(node_refs)
        .map(move |(sequence_id, node_id)| WayNodeRow {
            way_id,
            node_id: *node_id,
            sequence_id,
        })
}

/// Expand a relation's members into rows numbered from zero.
pub fn relation_member_rows(
    relation_id: i64,
    members: &[RelationMember],
) -> impl Iterator<Item = RelationMemberRow<'_>> + '_ {
    (0_i64..)
        .zip(members)
        .map(move |(sequence_id, member)| RelationMemberRow {
            relation_id,
            member_id: member.member_id,
            member_kind: member.member_kind,
            role: member.role.as_str(),
            sequence_id,
        })
}
