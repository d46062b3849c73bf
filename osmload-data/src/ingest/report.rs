//! Per-kind counters for a load run.
//!
//! Recording never changes control flow; the report is read once the stream
//! has drained.

use std::{collections::BTreeMap, fmt, time::Duration};

use log::info;
use osmload_core::{ElementKind, EntityKind};

/// Counts gathered while loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    processed: BTreeMap<ElementKind, u64>,
    skipped: BTreeMap<ElementKind, u64>,
    written: BTreeMap<EntityKind, u64>,
    failed_flushes: BTreeMap<EntityKind, u64>,
    failed_commits: BTreeMap<EntityKind, u64>,
    malformed: u64,
    elapsed: Duration,
}

impl LoadReport {
    /// Elements of `kind` routed to the accumulator.
    #[must_use]
    pub fn processed(&self, kind: ElementKind) -> u64 {
        self.processed.get(&kind).copied().unwrap_or_default()
    }

    /// Elements of `kind` dropped by the inclusion filter.
    #[must_use]
    pub fn skipped(&self, kind: ElementKind) -> u64 {
        self.skipped.get(&kind).copied().unwrap_or_default()
    }

    /// Rows of `kind` executed against the sink.
    #[must_use]
    pub fn written(&self, kind: EntityKind) -> u64 {
        self.written.get(&kind).copied().unwrap_or_default()
    }

    /// Flushes of `kind` that failed.
    #[must_use]
    pub fn failed_flushes(&self, kind: EntityKind) -> u64 {
        self.failed_flushes.get(&kind).copied().unwrap_or_default()
    }

    /// Failed flushes across all kinds.
    #[must_use]
    pub fn total_failed_flushes(&self) -> u64 {
        self.failed_flushes.values().sum()
    }

    /// Commits that failed across all kinds; their rows were rolled back.
    #[must_use]
    pub fn failed_commits(&self) -> u64 {
        self.failed_commits.values().sum()
    }

    /// Failed commits of transactions holding `kind` rows.
    #[must_use]
    pub fn failed_commits_of(&self, kind: EntityKind) -> u64 {
        self.failed_commits.get(&kind).copied().unwrap_or_default()
    }

    /// Elements the decoder could not convert.
    #[must_use]
    pub const fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Wall-clock time spent loading.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether every buffered row reached a successful commit.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total_failed_flushes() == 0 && self.failed_commits() == 0
    }

    pub(crate) fn record_processed(&mut self, kind: ElementKind) {
        *self.processed.entry(kind).or_default() += 1;
    }

    pub(crate) fn record_skipped(&mut self, kind: ElementKind) {
        *self.skipped.entry(kind).or_default() += 1;
    }

    pub(crate) fn record_written(&mut self, kind: EntityKind, rows: usize) {
        *self.written.entry(kind).or_default() += rows as u64;
    }

    /// Returns the running failure count for `kind`.
    pub(crate) fn record_failed_flush(&mut self, kind: EntityKind) -> u64 {
        let failures = self.failed_flushes.entry(kind).or_default();
        *failures += 1;
        *failures
    }

    /// Returns the running failed-commit count for `kind`.
    pub(crate) fn record_failed_commit(&mut self, kind: EntityKind) -> u64 {
        let failures = self.failed_commits.entry(kind).or_default();
        *failures += 1;
        *failures
    }

    pub(crate) fn record_malformed(&mut self, count: u64) {
        self.malformed += count;
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        info!("{self}");
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loaded")?;
        for (index, kind) in EntityKind::ALL.into_iter().enumerate() {
            let separator = if index == 0 { "" } else { "," };
            write!(f, "{separator} {} {}", self.written(kind), kind.label())?;
        }
        write!(f, " in {:.1?}", self.elapsed)?;
        let failures = self.total_failed_flushes() + self.failed_commits();
        if failures > 0 {
            write!(f, " ({failures} failed flushes or commits)")?;
        }
        Ok(())
    }
}
