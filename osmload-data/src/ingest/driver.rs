//! Routes the entity stream into the accumulator.

use std::{collections::BTreeSet, time::Instant};

use log::info;
use osmload_core::{ElementKind, Entity, RelationalSink, SessionError};

use super::{EntityAccumulator, LoadOptions, LoadReport};

/// Element kinds admitted into the load.
///
/// # Examples
/// ```
/// use osmload_core::ElementKind;
/// use osmload_data::ElementFilter;
///
/// let filter = ElementFilter::only([ElementKind::Way]);
/// assert!(filter.includes(ElementKind::Way));
/// assert!(!filter.includes(ElementKind::Node));
/// assert!(ElementFilter::all().includes(ElementKind::Node));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementFilter {
    included: Option<BTreeSet<ElementKind>>,
}

impl ElementFilter {
    /// Admit every kind.
    #[must_use]
    pub const fn all() -> Self {
        Self { included: None }
    }

    /// Admit only `kinds`. An empty set admits nothing.
    pub fn only(kinds: impl IntoIterator<Item = ElementKind>) -> Self {
        Self {
            included: Some(kinds.into_iter().collect()),
        }
    }

    /// Whether `kind` passes the filter.
    #[must_use]
    pub fn includes(&self, kind: ElementKind) -> bool {
        self.included
            .as_ref()
            .is_none_or(|included| included.contains(&kind))
    }
}

/// Single consumer of the entity stream.
pub struct IngestDriver<S: RelationalSink> {
    accumulator: EntityAccumulator<S>,
    filter: ElementFilter,
}

impl<S: RelationalSink> IngestDriver<S> {
    /// Driver writing to `sink` with the thresholds and filter in `options`.
    pub fn new(sink: S, options: &LoadOptions) -> Self {
        Self {
            accumulator: EntityAccumulator::new(sink, options.thresholds, options.counter_reset),
            filter: options.filter.clone(),
        }
    }

    /// Consume `entities`, drain every buffer and commit.
    ///
    /// Flush failures are counted in the report; only a failed final commit
    /// is returned as an error.
    ///
    /// # Examples
    /// ```
    /// use osmload_core::{Entity, User, test_support::{RecordingSink, node}};
    /// use osmload_data::{IngestDriver, LoadOptions};
    ///
    /// let sink = RecordingSink::new();
    /// let driver = IngestDriver::new(sink.clone(), &LoadOptions::default());
    /// let report = driver.run([Entity::Node(node(1, User::new(1, "alice")))])?;
    ///
    /// assert_eq!(sink.committed_count("nodes"), 1);
    /// assert!(report.is_complete());
    /// # Ok::<(), osmload_core::SessionError>(())
    /// ```
    pub fn run<I>(mut self, entities: I) -> Result<LoadReport, SessionError>
    where
        I: IntoIterator<Item = Entity>,
    {
        let started = Instant::now();
        for entity in entities {
            self.dispatch(entity);
        }
        info!("Entity stream drained; flushing remaining buffers");
        self.accumulator.finish(started)
    }

    fn dispatch(&mut self, entity: Entity) {
        let kind = entity.kind();
        if !self.filter.includes(kind) {
            self.accumulator.report_mut().record_skipped(kind);
            return;
        }
        self.accumulator.report_mut().record_processed(kind);
        match entity {
            Entity::Node(node) => self.accumulator.add_node(node),
            Entity::Way(way) => self.accumulator.add_way(way),
            Entity::Relation(relation) => self.accumulator.add_relation(relation),
        }
    }
}
