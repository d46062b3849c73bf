//! `osmpbf` decoding on a dedicated producer thread.

use std::{
    path::Path,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, bounded};
use geo::Point;
use log::{debug, warn};
use osmload_core::{ElementKind, Entity, Metadata, Node, Relation, RelationMember, Tags, User, Way};
use osmpbf::{DenseNode, Element, ElementReader, Info, RelMemberType};

use super::OsmLoadError;

/// Running producer: the entity stream plus the thread feeding it.
///
/// The thread yields the number of elements it had to drop as malformed.
pub(super) struct Producer {
    pub(super) entities: Receiver<Entity>,
    pub(super) handle: JoinHandle<Result<u64, osmpbf::Error>>,
}

/// Open `path` and start decoding it on the `pbf-reader` thread.
///
/// Opening happens on the caller's thread so a missing file is reported
/// before anything is spawned.
pub(super) fn spawn_reader(path: &Path, capacity: usize) -> Result<Producer, OsmLoadError> {
    let reader = ElementReader::from_path(path).map_err(|source| OsmLoadError::Open {
        source,
        path: path.to_path_buf(),
    })?;
    let (sender, entities) = bounded(capacity);
    let handle = thread::Builder::new()
        .name("pbf-reader".to_owned())
        .spawn(move || {
            let mut malformed = 0_u64;
            let mut disconnected = false;
            reader.for_each(|element| {
                if disconnected {
                    return;
                }
                match convert(element) {
                    Ok(entity) => {
                        if sender.send(entity).is_err() {
                            debug!("Entity consumer hung up; discarding the rest of the stream");
                            disconnected = true;
                        }
                    }
                    Err(reason) => {
                        malformed += 1;
                        warn!("Dropping malformed element: {reason}");
                    }
                }
            })?;
            Ok(malformed)
        })
        .map_err(|source| OsmLoadError::Spawn { source })?;
    Ok(Producer { entities, handle })
}

/// Convert a borrowed `osmpbf` element into an owned entity.
pub(super) fn convert(element: Element<'_>) -> Result<Entity, osmpbf::Error> {
    match element {
        Element::Node(node) => Ok(Entity::Node(Node {
            id: node.id(),
            metadata: info_metadata(&node.info())?,
            location: Point::new(node.lon(), node.lat()),
            tags: collect_tags(node.tags()),
        })),
        Element::DenseNode(node) => dense_node(&node),
        Element::Way(way) => Ok(Entity::Way(Way {
            id: way.id(),
            metadata: info_metadata(&way.info())?,
            tags: collect_tags(way.tags()),
            node_refs: way.refs().collect(),
        })),
        Element::Relation(relation) => {
            let members = relation
                .members()
                .map(|member| {
                    let role = member.role()?;
                    Ok(RelationMember::new(
                        member.member_id,
                        member_kind(&member.member_type),
                        role,
                    ))
                })
                .collect::<Result<Vec<_>, osmpbf::Error>>()?;
            Ok(Entity::Relation(Relation {
                id: relation.id(),
                metadata: info_metadata(&relation.info())?,
                tags: collect_tags(relation.tags()),
                members,
            }))
        }
    }
}

fn dense_node(node: &DenseNode<'_>) -> Result<Entity, osmpbf::Error> {
    let metadata = match node.info() {
        Some(info) => Metadata::new(
            info.version(),
            User::new(i64::from(info.uid()), info.user()?),
            Some(info.milli_timestamp()),
            info.changeset(),
        ),
        None => Metadata::default(),
    };
    Ok(Entity::Node(Node {
        id: node.id(),
        metadata,
        location: Point::new(node.lon(), node.lat()),
        tags: collect_tags(node.tags()),
    }))
}

fn info_metadata(info: &Info<'_>) -> Result<Metadata, osmpbf::Error> {
    let user = match info.uid() {
        Some(uid) => {
            let name = info.user().transpose()?.unwrap_or_default();
            User::new(i64::from(uid), name)
        }
        None => User::unknown(),
    };
    Ok(Metadata::new(
        info.version().unwrap_or_default(),
        user,
        info.milli_timestamp(),
        info.changeset().unwrap_or_default(),
    ))
}

fn collect_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

const fn member_kind(member_type: &RelMemberType) -> ElementKind {
    match member_type {
        RelMemberType::Node => ElementKind::Node,
        RelMemberType::Way => ElementKind::Way,
        RelMemberType::Relation => ElementKind::Relation,
    }
}
