//! Port to the relational store receiving the bulk load.
//!
//! The pipeline reaches the database only through [`RelationalSink`] and the
//! connections it opens. A connection runs with autocommit disabled, owns at
//! most one prepared insert, and accumulates bound rows until
//! [`SinkConnection::execute_batch`] sends them in one round trip.

use std::error::Error as StdError;

use geo::Point;
use thiserror::Error;

use crate::EntityKind;

/// A positional parameter bound to an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// A 64-bit integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// A WGS84 point (`x = longitude`, `y = latitude`). Sinks choose the
    /// geometry encoding.
    Point(Point<f64>),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Integer)
    }
}

impl From<Point<f64>> for SqlValue {
    fn from(value: Point<f64>) -> Self {
        Self::Point(value)
    }
}

/// Table and ordered column list for one entity kind's insert.
///
/// Column order is load-bearing: rows are bound positionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertStatement {
    /// Target table.
    pub table: &'static str,
    /// Columns in binding order.
    pub columns: &'static [&'static str],
}

impl InsertStatement {
    /// The insert registered for `kind`.
    ///
    /// # Examples
    /// ```
    /// use osmload_core::{EntityKind, InsertStatement};
    ///
    /// let statement = InsertStatement::for_kind(EntityKind::WayNode);
    /// assert_eq!(statement.table, "way_nodes");
    /// assert_eq!(statement.columns, &["way_id", "node_id", "sequence_id"]);
    /// ```
    #[must_use]
    pub const fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::User => Self {
                table: "users",
                columns: &["id", "name"],
            },
            EntityKind::Node => Self {
                table: "nodes",
                columns: &[
                    "id",
                    "version",
                    "user_id",
                    "tstamp",
                    "changeset_id",
                    "point",
                    "tags",
                ],
            },
            EntityKind::Way => Self {
                table: "ways",
                columns: &["id", "version", "user_id", "tstamp", "changeset_id", "tags"],
            },
            EntityKind::WayNode => Self {
                table: "way_nodes",
                columns: &["way_id", "node_id", "sequence_id"],
            },
            EntityKind::Relation => Self {
                table: "relations",
                columns: &["id", "version", "user_id", "tstamp", "changeset_id", "tags"],
            },
            EntityKind::RelationMember => Self {
                table: "relation_members",
                columns: &[
                    "relation_id",
                    "member_id",
                    "member_type",
                    "member_role",
                    "sequence_id",
                ],
            },
        }
    }

    /// Number of positional parameters.
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.columns.len()
    }
}

/// Boxed error returned by sink drivers.
pub type BoxedSinkError = Box<dyn StdError + Send + Sync>;

/// Failure reported by a sink adapter.
#[derive(Debug, Error)]
#[error("sink failed to {operation}")]
pub struct SinkError {
    /// Operation that failed, e.g. "open connection" or "commit".
    pub operation: &'static str,
    /// Underlying driver error.
    #[source]
    pub source: BoxedSinkError,
}

impl SinkError {
    /// Wrap a driver error with the operation that raised it.
    pub fn new(operation: &'static str, source: impl Into<BoxedSinkError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Factory for sink connections.
///
/// Connections are owned values so a session can hold one alongside the
/// sink that produced it.
///
/// # Examples
/// ```
/// use std::{cell::Cell, rc::Rc};
/// use osmload_core::{InsertStatement, RelationalSink, SinkConnection, SinkError, SqlValue};
///
/// #[derive(Default)]
/// struct CountingSink {
///     rows: Rc<Cell<usize>>,
/// }
///
/// struct CountingConnection {
///     rows: Rc<Cell<usize>>,
///     pending: usize,
/// }
///
/// impl RelationalSink for CountingSink {
///     type Connection = CountingConnection;
///
///     fn open(&mut self) -> Result<Self::Connection, SinkError> {
///         Ok(CountingConnection { rows: Rc::clone(&self.rows), pending: 0 })
///     }
/// }
///
/// impl SinkConnection for CountingConnection {
///     fn prepare(&mut self, _statement: InsertStatement) -> Result<(), SinkError> {
///         Ok(())
///     }
///     fn add_row(&mut self, _row: Vec<SqlValue>) -> Result<(), SinkError> {
///         self.pending += 1;
///         Ok(())
///     }
///     fn pending_rows(&self) -> usize {
///         self.pending
///     }
///     fn clear_batch(&mut self) {
///         self.pending = 0;
///     }
///     fn execute_batch(&mut self) -> Result<usize, SinkError> {
///         self.rows.set(self.rows.get() + self.pending);
///         Ok(std::mem::take(&mut self.pending))
///     }
///     fn commit(&mut self) -> Result<(), SinkError> {
///         Ok(())
///     }
///     fn rollback(&mut self) -> Result<(), SinkError> {
///         Ok(())
///     }
///     fn close(self) -> Result<(), SinkError> {
///         Ok(())
///     }
/// }
///
/// let mut sink = CountingSink::default();
/// let mut connection = sink.open()?;
/// connection.add_row(vec![SqlValue::Integer(1)])?;
/// assert_eq!(connection.execute_batch()?, 1);
/// assert_eq!(sink.rows.get(), 1);
/// # Ok::<(), SinkError>(())
/// ```
pub trait RelationalSink {
    /// Connection type handed out by [`open`](Self::open).
    type Connection: SinkConnection;

    /// Open a connection with autocommit disabled.
    fn open(&mut self) -> Result<Self::Connection, SinkError>;
}

/// A live connection owning at most one prepared insert.
pub trait SinkConnection {
    /// Prepare `statement`, replacing any previously prepared insert.
    fn prepare(&mut self, statement: InsertStatement) -> Result<(), SinkError>;

    /// Bind `row` to the prepared insert and append it to the pending batch.
    ///
    /// No round trip to the store happens here.
    fn add_row(&mut self, row: Vec<SqlValue>) -> Result<(), SinkError>;

    /// Number of rows added since the last successful execution.
    fn pending_rows(&self) -> usize;

    /// Drop pending rows without sending them.
    fn clear_batch(&mut self);

    /// Execute the pending batch in one round trip, returning the row count.
    ///
    /// On failure the pending rows are discarded; the transaction itself is
    /// left for the caller to commit or roll back.
    fn execute_batch(&mut self) -> Result<usize, SinkError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), SinkError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), SinkError>;

    /// Release the prepared statement and the connection.
    fn close(self) -> Result<(), SinkError>;
}
