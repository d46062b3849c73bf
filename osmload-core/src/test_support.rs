//! Test-only, in-memory `RelationalSink` used by unit and behaviour tests.
//!
//! [`RecordingSink`] keeps executed rows in a per-connection transaction
//! buffer and only moves them into the committed tables on commit, so tests
//! can assert what would survive a crash as well as what was attempted.

use std::{
    cell::{Ref, RefCell},
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use geo::Point;

use crate::{
    ElementKind, InsertStatement, Metadata, Node, Relation, RelationMember, RelationalSink,
    SinkConnection, SinkError, SqlValue, Tags, User, Way,
};

/// Observable sink activity, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// A connection was opened.
    Open,
    /// An insert was prepared for the named table.
    Prepare(&'static str),
    /// A batch of `rows` rows was executed against `table`.
    Execute {
        /// Target table.
        table: &'static str,
        /// Rows sent.
        rows: usize,
    },
    /// The transaction was committed.
    Commit,
    /// The transaction was rolled back.
    Rollback,
    /// The connection was closed.
    Close,
}

type Row = Vec<SqlValue>;

#[derive(Debug, Default)]
struct Journal {
    events: Vec<SinkEvent>,
    committed: BTreeMap<&'static str, Vec<Row>>,
    open_connections: usize,
    max_open_connections: usize,
    fail_open: bool,
    fail_commit: bool,
    fail_execute: BTreeSet<&'static str>,
}

/// Shared-handle sink that records every call.
///
/// Clones share one journal, so a test can keep a clone while a
/// [`WriteSession`](crate::WriteSession) owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    journal: Rc<RefCell<Journal>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.journal().events.clone()
    }

    /// Committed rows for `table`, in insertion order.
    #[must_use]
    pub fn committed_rows(&self, table: &str) -> Vec<Row> {
        self.journal()
            .committed
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of committed rows for `table`.
    #[must_use]
    pub fn committed_count(&self, table: &str) -> usize {
        self.journal().committed.get(table).map_or(0, Vec::len)
    }

    /// Number of commits performed.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.count(|event| matches!(event, SinkEvent::Commit))
    }

    /// Number of rollbacks performed.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.count(|event| matches!(event, SinkEvent::Rollback))
    }

    /// Row counts of each batch executed against `table`.
    #[must_use]
    pub fn executions(&self, table: &str) -> Vec<usize> {
        self.journal()
            .events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Execute { table: t, rows } if *t == table => Some(*rows),
                _ => None,
            })
            .collect()
    }

    /// Connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.journal().open_connections
    }

    /// Highest number of connections open at once.
    #[must_use]
    pub fn max_open_connections(&self) -> usize {
        self.journal().max_open_connections
    }

    /// Make subsequent `open` calls fail.
    pub fn fail_open(&self, fail: bool) {
        self.journal.borrow_mut().fail_open = fail;
    }

    /// Make subsequent commits fail.
    pub fn fail_commit(&self, fail: bool) {
        self.journal.borrow_mut().fail_commit = fail;
    }

    /// Make batches against `table` fail until cleared.
    pub fn fail_execute(&self, table: &'static str) {
        self.journal.borrow_mut().fail_execute.insert(table);
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        let mut journal = self.journal.borrow_mut();
        journal.fail_open = false;
        journal.fail_commit = false;
        journal.fail_execute.clear();
    }

    fn journal(&self) -> Ref<'_, Journal> {
        self.journal.borrow()
    }

    fn count(&self, predicate: impl Fn(&SinkEvent) -> bool) -> usize {
        self.journal().events.iter().filter(|e| predicate(e)).count()
    }
}

impl RelationalSink for RecordingSink {
    type Connection = RecordingConnection;

    fn open(&mut self) -> Result<Self::Connection, SinkError> {
        let mut journal = self.journal.borrow_mut();
        if journal.fail_open {
            return Err(injected("open connection"));
        }
        journal.events.push(SinkEvent::Open);
        journal.open_connections += 1;
        journal.max_open_connections = journal.max_open_connections.max(journal.open_connections);
        Ok(RecordingConnection {
            journal: Rc::clone(&self.journal),
            statement: None,
            pending: Vec::new(),
            uncommitted: Vec::new(),
        })
    }
}

/// Connection handed out by [`RecordingSink`].
#[derive(Debug)]
pub struct RecordingConnection {
    journal: Rc<RefCell<Journal>>,
    statement: Option<InsertStatement>,
    pending: Vec<Row>,
    uncommitted: Vec<(&'static str, Row)>,
}

impl SinkConnection for RecordingConnection {
    fn prepare(&mut self, statement: InsertStatement) -> Result<(), SinkError> {
        self.journal
            .borrow_mut()
            .events
            .push(SinkEvent::Prepare(statement.table));
        self.statement = Some(statement);
        self.pending.clear();
        Ok(())
    }

    fn add_row(&mut self, row: Vec<SqlValue>) -> Result<(), SinkError> {
        let statement = self
            .statement
            .ok_or_else(|| SinkError::new("bind row", "no statement prepared"))?;
        if row.len() != statement.arity() {
            return Err(SinkError::new(
                "bind row",
                format!(
                    "{} expects {} parameters, got {}",
                    statement.table,
                    statement.arity(),
                    row.len()
                ),
            ));
        }
        self.pending.push(row);
        Ok(())
    }

    fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    fn clear_batch(&mut self) {
        self.pending.clear();
    }

    fn execute_batch(&mut self) -> Result<usize, SinkError> {
        let statement = self
            .statement
            .ok_or_else(|| SinkError::new("execute batch", "no statement prepared"))?;
        let rows = std::mem::take(&mut self.pending);
        let mut journal = self.journal.borrow_mut();
        if journal.fail_execute.contains(statement.table) {
            return Err(injected("execute batch"));
        }
        journal.events.push(SinkEvent::Execute {
            table: statement.table,
            rows: rows.len(),
        });
        let count = rows.len();
        self.uncommitted
            .extend(rows.into_iter().map(|row| (statement.table, row)));
        Ok(count)
    }

    fn commit(&mut self) -> Result<(), SinkError> {
        let mut journal = self.journal.borrow_mut();
        if journal.fail_commit {
            return Err(injected("commit"));
        }
        journal.events.push(SinkEvent::Commit);
        for (table, row) in self.uncommitted.drain(..) {
            journal.committed.entry(table).or_default().push(row);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SinkError> {
        self.journal.borrow_mut().events.push(SinkEvent::Rollback);
        self.uncommitted.clear();
        Ok(())
    }

    fn close(self) -> Result<(), SinkError> {
        let mut journal = self.journal.borrow_mut();
        journal.events.push(SinkEvent::Close);
        journal.open_connections = journal.open_connections.saturating_sub(1);
        Ok(())
    }
}

fn injected(operation: &'static str) -> SinkError {
    SinkError::new(operation, "injected failure")
}

/// Node at the origin authored by `user`.
#[must_use]
pub fn node(id: i64, user: User) -> Node {
    Node {
        id,
        metadata: Metadata::new(1, user, Some(1_700_000_000_000), 1),
        location: Point::new(0.1, 51.5),
        tags: Tags::new(),
    }
}

/// Untagged way over `node_refs` authored by `user`.
#[must_use]
pub fn way(id: i64, user: User, node_refs: &[i64]) -> Way {
    Way {
        id,
        metadata: Metadata::new(1, user, Some(1_700_000_000_000), 1),
        tags: Tags::new(),
        node_refs: node_refs.to_vec(),
    }
}

/// Untagged relation over `members` authored by `user`.
#[must_use]
pub fn relation(id: i64, user: User, members: &[(i64, ElementKind, &str)]) -> Relation {
    Relation {
        id,
        metadata: Metadata::new(1, user, Some(1_700_000_000_000), 1),
        tags: Tags::new(),
        members: members
            .iter()
            .map(|(member_id, kind, role)| RelationMember::new(*member_id, *kind, *role))
            .collect(),
    }
}
