//! Single-writer transactional session over a [`RelationalSink`].
//!
//! The session is a two-state machine: `Closed`, or `OpenFor(kind)` holding
//! one connection with the insert for `kind` prepared. Switching to another
//! kind commits the shared transaction first ([`WriteSession::switch_type`]),
//! so the transaction boundary follows the interleaving of entity kinds the
//! caller produces.
//!
//! The session owns its sink and every operation takes `&mut self`, so only
//! one writer can exist per sink.

use std::{fmt, mem};

use log::{debug, warn};
use thiserror::Error;

use crate::{
    EntityKind, InsertStatement, Node, Relation, RelationMember, RelationalSink, SinkConnection,
    SinkError, SqlValue, Way,
    entity::{relation_member_rows, way_node_rows},
};

mod rows;

pub use rows::NO_NAME_FOUND;

/// Result of [`WriteSession::begin_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStart {
    /// Whether a session for another kind was committed to make room.
    pub previous_committed: bool,
}

/// Errors raised by [`WriteSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The sink could not be reached to open, prepare, commit, roll back or
    /// close.
    #[error("write session lost its sink connection")]
    Connection {
        /// Sink failure.
        #[source]
        source: SinkError,
    },
    /// Rows were inserted without a matching open session.
    #[error("cannot insert {requested} while the session is open for {}", .open.map_or("nothing", EntityKind::label))]
    IllegalState {
        /// Kind the caller tried to insert.
        requested: EntityKind,
        /// Kind the session is open for, if any.
        open: Option<EntityKind>,
    },
    /// Committing `previous` to make room for `next` failed. The rows of
    /// `previous` were rolled back and the session is closed.
    #[error("failed to commit {previous} batch before switching to {next}")]
    SwitchCommit {
        /// Kind whose transaction was rolled back.
        previous: EntityKind,
        /// Kind the caller asked for.
        next: EntityKind,
        /// Sink failure.
        #[source]
        source: SinkError,
    },
    /// `committed` was committed, but no session could be opened for `next`.
    /// The session is closed.
    #[error("committed {committed} batch but failed to open a session for {next}")]
    SwitchOpen {
        /// Kind whose transaction was committed.
        committed: EntityKind,
        /// Kind the caller asked for.
        next: EntityKind,
        /// Sink failure.
        #[source]
        source: SinkError,
    },
    /// Executing a batch failed.
    #[error("failed to execute {kind} batch")]
    Batch {
        /// Kind of the failed batch.
        kind: EntityKind,
        /// Sink failure.
        #[source]
        source: SinkError,
    },
}

enum SessionState<C> {
    Closed,
    OpenFor { kind: EntityKind, connection: C },
}

/// Serializes batched inserts for all entity kinds through one connection.
///
/// # Examples
/// ```
/// use osmload_core::{EntityKind, WriteSession, test_support::RecordingSink};
///
/// let sink = RecordingSink::new();
/// let mut session = WriteSession::new(sink.clone());
///
/// assert!(!session.begin_batch(EntityKind::User)?.previous_committed);
/// session.insert_users([(7, "alice")])?;
/// assert!(session.begin_batch(EntityKind::Node)?.previous_committed);
/// session.end_batch(true)?;
///
/// assert!(!session.has_pending_write());
/// assert_eq!(sink.committed_count("users"), 1);
/// # Ok::<(), osmload_core::SessionError>(())
/// ```
pub struct WriteSession<S: RelationalSink> {
    sink: S,
    state: SessionState<S::Connection>,
}

impl<S: RelationalSink> WriteSession<S> {
    /// Take ownership of `sink`. The session starts closed.
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            state: SessionState::Closed,
        }
    }

    /// Kind the session is currently open for.
    pub const fn open_kind(&self) -> Option<EntityKind> {
        match &self.state {
            SessionState::Closed => None,
            SessionState::OpenFor { kind, .. } => Some(*kind),
        }
    }

    /// Whether an uncommitted connection and statement exist.
    pub const fn has_pending_write(&self) -> bool {
        matches!(self.state, SessionState::OpenFor { .. })
    }

    /// Ensure the session is open for `kind`.
    ///
    /// Opening from `Closed` and re-entering the same kind report
    /// `previous_committed = false`; arriving from another kind delegates to
    /// [`switch_type`](Self::switch_type).
    pub fn begin_batch(&mut self, kind: EntityKind) -> Result<BatchStart, SessionError> {
        match self.open_kind() {
            None => {
                self.open_for(kind)?;
                Ok(BatchStart::default())
            }
            Some(open) if open == kind => Ok(BatchStart::default()),
            Some(_) => self.switch_type(kind),
        }
    }

    /// Commit and close the current session, then open one for `kind`.
    ///
    /// This is the only implicit commit the session performs. A failure in
    /// either step leaves the session closed and is reported as
    /// [`SessionError::SwitchCommit`] or [`SessionError::SwitchOpen`], so the
    /// caller knows whether the previous transaction survived.
    pub fn switch_type(&mut self, kind: EntityKind) -> Result<BatchStart, SessionError> {
        let Some(previous) = self.open_kind() else {
            self.open_for(kind)?;
            return Ok(BatchStart::default());
        };
        self.end_batch(true).map_err(|error| match error {
            SessionError::Connection { source } => SessionError::SwitchCommit {
                previous,
                next: kind,
                source,
            },
            other => other,
        })?;
        debug!("Committed {previous} batch to switch the session to {kind}");
        self.open_for(kind).map_err(|error| match error {
            SessionError::Connection { source } => SessionError::SwitchOpen {
                committed: previous,
                next: kind,
                source,
            },
            other => other,
        })?;
        Ok(BatchStart {
            previous_committed: true,
        })
    }

    /// Finish the current session.
    ///
    /// With `commit`, any rows not yet executed are sent and the transaction
    /// is committed; otherwise it is rolled back. The statement and
    /// connection are released and the session returns to `Closed` even when
    /// the sink reports an error. Ending a closed session is a no-op.
    pub fn end_batch(&mut self, commit: bool) -> Result<(), SessionError> {
        let SessionState::OpenFor {
            kind,
            mut connection,
        } = mem::replace(&mut self.state, SessionState::Closed)
        else {
            return Ok(());
        };

        let outcome = if commit {
            commit_pending(&mut connection)
        } else {
            connection.rollback()
        };
        if commit && let Err(error) = &outcome {
            warn!("Commit of {kind} session failed ({error}); rolling back");
            if let Err(rollback) = connection.rollback() {
                warn!("Rollback after failed commit also failed: {rollback}");
            }
        }
        let closed = connection.close();

        match (outcome, closed) {
            (Err(source), closed) => {
                if let Err(close) = closed {
                    warn!("Closing {kind} session after failure also failed: {close}");
                }
                Err(SessionError::Connection { source })
            }
            (Ok(()), Err(source)) => Err(SessionError::Connection { source }),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Insert users as `(id, name)` pairs.
    ///
    /// Empty names are stored as [`NO_NAME_FOUND`].
    pub fn insert_users<'a, I>(&mut self, users: I) -> Result<usize, SessionError>
    where
        I: IntoIterator<Item = (i64, &'a str)>,
    {
        self.insert_rows(
            EntityKind::User,
            users.into_iter().map(|(id, name)| rows::user_row(id, name)),
        )
    }

    /// Insert nodes.
    pub fn insert_nodes(&mut self, nodes: &[Node]) -> Result<usize, SessionError> {
        self.insert_rows(EntityKind::Node, nodes.iter().map(rows::node_row))
    }

    /// Insert ways. Member lists go through
    /// [`insert_way_nodes`](Self::insert_way_nodes).
    pub fn insert_ways(&mut self, ways: &[Way]) -> Result<usize, SessionError> {
        self.insert_rows(EntityKind::Way, ways.iter().map(rows::way_row))
    }

    /// Insert one `way_nodes` row per member for each `(way_id, node_refs)`.
    pub fn insert_way_nodes<'a, I>(&mut self, ways: I) -> Result<usize, SessionError>
    where
        I: IntoIterator<Item = (i64, &'a [i64])>,
    {
        self.insert_rows(
            EntityKind::WayNode,
            ways.into_iter()
                .flat_map(|(way_id, node_refs)| way_node_rows(way_id, node_refs))
                .map(rows::way_node_row),
        )
    }

    /// Insert relations. Member lists go through
    /// [`insert_relation_members`](Self::insert_relation_members).
    pub fn insert_relations(&mut self, relations: &[Relation]) -> Result<usize, SessionError> {
        self.insert_rows(EntityKind::Relation, relations.iter().map(rows::relation_row))
    }

    /// Insert one `relation_members` row per member for each
    /// `(relation_id, members)`.
    pub fn insert_relation_members<'a, I>(&mut self, relations: I) -> Result<usize, SessionError>
    where
        I: IntoIterator<Item = (i64, &'a [RelationMember])>,
    {
        self.insert_rows(
            EntityKind::RelationMember,
            relations
                .into_iter()
                .flat_map(|(relation_id, members)| relation_member_rows(relation_id, members))
                .map(rows::relation_member_row),
        )
    }

    /// Borrow the underlying sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Release the sink, rolling back any session still open.
    pub fn into_sink(mut self) -> S {
        if let Some(kind) = self.open_kind() {
            warn!("Discarding uncommitted {kind} session");
            if let Err(error) = self.end_batch(false) {
                warn!("Rolling back {kind} session failed: {error}");
            }
        }
        self.sink
    }

    fn open_for(&mut self, kind: EntityKind) -> Result<(), SessionError> {
        let mut connection = self
            .sink
            .open()
            .map_err(|source| SessionError::Connection { source })?;
        if let Err(source) = connection.prepare(InsertStatement::for_kind(kind)) {
            if let Err(close) = connection.close() {
                warn!("Closing connection after failed prepare also failed: {close}");
            }
            return Err(SessionError::Connection { source });
        }
        debug!("Opened write session for {kind}");
        self.state = SessionState::OpenFor { kind, connection };
        Ok(())
    }

    fn insert_rows<I>(&mut self, kind: EntityKind, rows: I) -> Result<usize, SessionError>
    where
        I: IntoIterator<Item = Vec<SqlValue>>,
    {
        let connection = self.connection_for(kind)?;
        for row in rows {
            if let Err(source) = connection.add_row(row) {
                connection.clear_batch();
                return Err(SessionError::Batch { kind, source });
            }
        }
        connection
            .execute_batch()
            .map_err(|source| SessionError::Batch { kind, source })
    }

    fn connection_for(&mut self, kind: EntityKind) -> Result<&mut S::Connection, SessionError> {
        match &mut self.state {
            SessionState::OpenFor {
                kind: open,
                connection,
            } if *open == kind => Ok(connection),
            SessionState::OpenFor { kind: open, .. } => Err(SessionError::IllegalState {
                requested: kind,
                open: Some(*open),
            }),
            SessionState::Closed => Err(SessionError::IllegalState {
                requested: kind,
                open: None,
            }),
        }
    }
}

impl<S: RelationalSink + fmt::Debug> fmt::Debug for WriteSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSession")
            .field("sink", &self.sink)
            .field("open_kind", &self.open_kind())
            .finish()
    }
}

fn commit_pending<C: SinkConnection>(connection: &mut C) -> Result<(), SinkError> {
    if connection.pending_rows() > 0 {
        connection.execute_batch()?;
    }
    connection.commit()
}
