//! Per-kind buffering between the ingest driver and the write session.
//!
//! Buffers flush when they reach the row threshold. Flushed rows count
//! towards a since-commit counter per kind; crossing the commit threshold
//! ends the shared transaction. Because the session has one transaction for
//! every kind, by default any commit (on a threshold, or implicit on a kind
//! switch) resets all counters through [`CommitCounters::reset`].

use std::{collections::BTreeMap, mem, time::Instant};

use log::{debug, error, info};
use osmload_core::{
    EntityKind, Node, Relation, RelationMember, RelationalSink, SessionError, User, Way,
    WriteSession,
};

use super::LoadReport;

/// Flush and commit thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Buffered entries that trigger a flush.
    pub row: usize,
    /// Rows since the last commit that trigger a commit, for users, nodes,
    /// ways and relations.
    pub commit: usize,
    /// Parents since the last commit that trigger a commit, for way nodes and
    /// relation members.
    pub member_commit: usize,
}

impl Thresholds {
    /// Default flush size.
    pub const DEFAULT_ROW: usize = 10_000;
    /// Default commit size.
    pub const DEFAULT_COMMIT: usize = 1_000_000;

    /// Thresholds with `member_commit` derived as five times `row`.
    #[must_use]
    pub const fn new(row: usize, commit: usize) -> Self {
        Self {
            row,
            commit,
            member_commit: row.saturating_mul(5),
        }
    }

    /// Override the member commit threshold.
    #[must_use]
    pub const fn with_member_commit(mut self, member_commit: usize) -> Self {
        self.member_commit = member_commit;
        self
    }

    /// Commit threshold applying to `kind`.
    #[must_use]
    pub const fn commit_for(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::WayNode | EntityKind::RelationMember => self.member_commit,
            EntityKind::User | EntityKind::Node | EntityKind::Way | EntityKind::Relation => {
                self.commit
            }
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROW, Self::DEFAULT_COMMIT)
    }
}

/// Which counters a commit clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterReset {
    /// Every counter on every commit, matching the single shared
    /// transaction.
    #[default]
    Global,
    /// Only the counter of a kind that crossed its own commit threshold.
    /// Commits caused by kind switches leave the counters untouched.
    PerType,
}

/// Why the shared transaction committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitCause {
    /// `kind` reached its commit threshold.
    Threshold(EntityKind),
    /// The session switched to another kind.
    Switch,
}

/// Rows flushed per kind since the last observed commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitCounters {
    policy: CounterReset,
    since_commit: BTreeMap<EntityKind, usize>,
}

impl CommitCounters {
    /// Empty counters using `policy`.
    #[must_use]
    pub const fn new(policy: CounterReset) -> Self {
        Self {
            policy,
            since_commit: BTreeMap::new(),
        }
    }

    /// Current count for `kind`.
    #[must_use]
    pub fn get(&self, kind: EntityKind) -> usize {
        self.since_commit.get(&kind).copied().unwrap_or_default()
    }

    /// Add `rows` to `kind` and return the new count.
    pub fn add(&mut self, kind: EntityKind, rows: usize) -> usize {
        let count = self.since_commit.entry(kind).or_default();
        *count = count.saturating_add(rows);
        *count
    }

    /// Apply the reset policy to an observed commit.
    pub fn reset(&mut self, cause: CommitCause) {
        match (self.policy, cause) {
            (CounterReset::Global, _) => self.since_commit.clear(),
            (CounterReset::PerType, CommitCause::Threshold(kind)) => {
                self.since_commit.remove(&kind);
            }
            (CounterReset::PerType, CommitCause::Switch) => {}
        }
    }
}

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered.
    Empty,
    /// The batch executed; the transaction is still open.
    Flushed {
        /// Rows executed.
        rows: usize,
    },
    /// The batch executed and the commit threshold committed it.
    Committed {
        /// Rows executed.
        rows: usize,
    },
    /// The batch executed but the threshold commit failed and rolled back.
    CommitFailed {
        /// Rows lost to the rollback.
        rows: usize,
    },
    /// The batch failed; the buffer was kept for the next attempt.
    Failed,
}

/// Buffers entities per kind and drives the write session.
pub struct EntityAccumulator<S: RelationalSink> {
    session: WriteSession<S>,
    thresholds: Thresholds,
    counters: CommitCounters,
    users: BTreeMap<i64, String>,
    nodes: Vec<Node>,
    ways: Vec<Way>,
    way_nodes: BTreeMap<i64, Vec<i64>>,
    relations: Vec<Relation>,
    relation_members: BTreeMap<i64, Vec<RelationMember>>,
    report: LoadReport,
}

impl<S: RelationalSink> EntityAccumulator<S> {
    /// Accumulator writing through a new session on `sink`.
    pub fn new(sink: S, thresholds: Thresholds, reset: CounterReset) -> Self {
        Self {
            session: WriteSession::new(sink),
            thresholds,
            counters: CommitCounters::new(reset),
            users: BTreeMap::new(),
            nodes: Vec::new(),
            ways: Vec::new(),
            way_nodes: BTreeMap::new(),
            relations: Vec::new(),
            relation_members: BTreeMap::new(),
            report: LoadReport::default(),
        }
    }

    /// Buffer a node and its author.
    pub fn add_node(&mut self, node: Node) {
        self.add_user(&node.metadata.user);
        self.nodes.push(node);
        self.flush_if_full(EntityKind::Node);
    }

    /// Buffer a way, its author, and its node references.
    pub fn add_way(&mut self, mut way: Way) {
        self.add_user(&way.metadata.user);
        // Member lists live only in the side buffer.
        self.way_nodes.insert(way.id, mem::take(&mut way.node_refs));
        self.ways.push(way);
        self.flush_if_full(EntityKind::Way);
        self.flush_if_full(EntityKind::WayNode);
    }

    /// Buffer a relation, its author, and its members.
    pub fn add_relation(&mut self, mut relation: Relation) {
        self.add_user(&relation.metadata.user);
        self.relation_members
            .insert(relation.id, mem::take(&mut relation.members));
        self.relations.push(relation);
        self.flush_if_full(EntityKind::Relation);
        self.flush_if_full(EntityKind::RelationMember);
    }

    /// Entries currently buffered for `kind`. Maps count parents.
    #[must_use]
    pub fn buffered(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::User => self.users.len(),
            EntityKind::Node => self.nodes.len(),
            EntityKind::Way => self.ways.len(),
            EntityKind::WayNode => self.way_nodes.len(),
            EntityKind::Relation => self.relations.len(),
            EntityKind::RelationMember => self.relation_members.len(),
        }
    }

    /// Counters since the last observed commit.
    #[must_use]
    pub const fn counters(&self) -> &CommitCounters {
        &self.counters
    }

    /// Whether the session holds uncommitted work.
    #[must_use]
    pub const fn has_pending_write(&self) -> bool {
        self.session.has_pending_write()
    }

    /// Report gathered so far.
    #[must_use]
    pub const fn report(&self) -> &LoadReport {
        &self.report
    }

    pub(crate) const fn report_mut(&mut self) -> &mut LoadReport {
        &mut self.report
    }

    /// Write the buffer for `kind` and clear it on success.
    ///
    /// Failures are logged and counted; the buffer is kept so the next
    /// threshold crossing or the final drain retries it.
    pub fn flush(&mut self, kind: EntityKind) -> FlushOutcome {
        let size = self.buffered(kind);
        if size == 0 {
            return FlushOutcome::Empty;
        }
        match self.write(kind) {
            Ok(rows) => {
                self.clear(kind);
                self.report.record_written(kind, rows);
                debug!("Flushed {rows} {kind}");
                if self.counters.add(kind, size) >= self.thresholds.commit_for(kind) {
                    self.commit(kind, rows)
                } else {
                    FlushOutcome::Flushed { rows }
                }
            }
            Err(err) => {
                let failures = self.report.record_failed_flush(kind);
                error!("Failed to flush {size} buffered {kind} (failure {failures}): {err}");
                FlushOutcome::Failed
            }
        }
    }

    /// Drain every buffer in referential order, then commit.
    ///
    /// Buffers that still fail are counted in the report. An error is
    /// returned only when the final commit fails.
    pub fn finish(mut self, started: Instant) -> Result<LoadReport, SessionError> {
        for kind in EntityKind::ALL {
            self.flush(kind);
        }
        let open = self.session.open_kind();
        let committed = self.session.end_batch(true);
        if let (Err(err), Some(kind)) = (&committed, open) {
            self.report.record_failed_commit(kind);
            error!("Final commit of {kind} failed: {err}");
        }
        self.report.finish(started.elapsed());
        committed.map(|()| self.report)
    }

    fn add_user(&mut self, user: &User) {
        if self.users.contains_key(&user.id) {
            return;
        }
        self.users.insert(user.id, user.name.clone());
        self.flush_if_full(EntityKind::User);
    }

    fn flush_if_full(&mut self, kind: EntityKind) {
        if self.buffered(kind) >= self.thresholds.row {
            self.flush(kind);
        }
    }

    fn commit(&mut self, kind: EntityKind, rows: usize) -> FlushOutcome {
        let outcome = match self.session.end_batch(true) {
            Ok(()) => {
                info!("Committed after {} {kind}", self.counters.get(kind));
                FlushOutcome::Committed { rows }
            }
            Err(err) => {
                self.report.record_failed_commit(kind);
                error!("Commit after flushing {kind} failed: {err}");
                FlushOutcome::CommitFailed { rows }
            }
        };
        self.counters.reset(CommitCause::Threshold(kind));
        outcome
    }

    /// Open the session for `kind`, keeping the counters in step with any
    /// commit the switch performed.
    ///
    /// A failed switch commit is counted against the previous kind, whose
    /// rows were rolled back, and the session is reopened for `kind`.
    fn begin(&mut self, kind: EntityKind) -> Result<(), SessionError> {
        match self.session.begin_batch(kind) {
            Ok(start) => {
                if start.previous_committed {
                    self.counters.reset(CommitCause::Switch);
                }
                Ok(())
            }
            Err(SessionError::SwitchCommit {
                previous, source, ..
            }) => {
                let failures = self.report.record_failed_commit(previous);
                error!(
                    "Commit of {previous} before switching to {kind} failed \
                     (failure {failures}): {source}"
                );
                self.counters.reset(CommitCause::Switch);
                self.session.begin_batch(kind).map(|_| ())
            }
            Err(err @ SessionError::SwitchOpen { .. }) => {
                self.counters.reset(CommitCause::Switch);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn write(&mut self, kind: EntityKind) -> Result<usize, SessionError> {
        self.begin(kind)?;
        match kind {
            EntityKind::User => self
                .session
                .insert_users(self.users.iter().map(|(id, name)| (*id, name.as_str()))),
            EntityKind::Node => self.session.insert_nodes(&self.nodes),
            EntityKind::Way => self.session.insert_ways(&self.ways),
            EntityKind::WayNode => self.session.insert_way_nodes(
                self.way_nodes
                    .iter()
                    .map(|(id, refs)| (*id, refs.as_slice())),
            ),
            EntityKind::Relation => self.session.insert_relations(&self.relations),
            EntityKind::RelationMember => self.session.insert_relation_members(
                self.relation_members
                    .iter()
                    .map(|(id, members)| (*id, members.as_slice())),
            ),
        }
    }

    fn clear(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::User => self.users.clear(),
            EntityKind::Node => self.nodes.clear(),
            EntityKind::Way => self.ways.clear(),
            EntityKind::WayNode => self.way_nodes.clear(),
            EntityKind::Relation => self.relations.clear(),
            EntityKind::RelationMember => self.relation_members.clear(),
        }
    }
}

#[cfg(test)]
mod tests;
