//! Streaming OSM PBF load into a relational sink.
//!
//! The decoder runs on a producer thread and hands owned entities over a
//! bounded channel to the calling thread, which is the only user of the
//! write session.

use std::path::{Path, PathBuf};

use log::{info, warn};
use osmload_core::{RelationalSink, SessionError};
use thiserror::Error;

mod accumulator;
mod driver;
mod pbf;
mod report;

pub use accumulator::{
    CommitCause, CommitCounters, CounterReset, EntityAccumulator, FlushOutcome, Thresholds,
};
pub use driver::{ElementFilter, IngestDriver};
pub use report::LoadReport;

/// Tuning for a load run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Flush and commit thresholds.
    pub thresholds: Thresholds,
    /// Commit counter reset policy.
    pub counter_reset: CounterReset,
    /// Element kinds to load.
    pub filter: ElementFilter,
    /// Entities buffered between the decoder thread and the loader.
    pub channel_capacity: usize,
}

impl LoadOptions {
    /// Default bound on in-flight entities.
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

    /// Replace the thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Replace the counter reset policy.
    #[must_use]
    pub fn with_counter_reset(mut self, counter_reset: CounterReset) -> Self {
        self.counter_reset = counter_reset;
        self
    }

    /// Replace the inclusion filter.
    #[must_use]
    pub fn with_filter(mut self, filter: ElementFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Replace the channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            counter_reset: CounterReset::default(),
            filter: ElementFilter::all(),
            channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Errors returned when loading an OSM PBF file.
#[derive(Debug, Error)]
pub enum OsmLoadError {
    /// The file could not be opened.
    #[error("failed to open OSM PBF file at {path:?}")]
    Open {
        /// Source error returned by `osmpbf`.
        #[source]
        source: osmpbf::Error,
        /// Path that failed to open.
        path: PathBuf,
    },
    /// Decoding stopped part-way; entities read before the failure were
    /// loaded.
    #[error("failed to decode OSM PBF data at {path:?}")]
    Decode {
        /// Source error returned by `osmpbf`.
        #[source]
        source: osmpbf::Error,
        /// Path being decoded.
        path: PathBuf,
    },
    /// The decoder thread could not be started.
    #[error("failed to spawn the PBF reader thread")]
    Spawn {
        /// Source error from the OS.
        #[source]
        source: std::io::Error,
    },
    /// The decoder thread panicked.
    #[error("PBF reader thread panicked while decoding {path:?}")]
    ReaderThread {
        /// Path being decoded.
        path: PathBuf,
    },
    /// The final commit failed.
    #[error("failed to commit the load")]
    Sink {
        /// Session failure.
        #[source]
        source: SessionError,
    },
}

/// Stream an OSM PBF file into `sink`.
///
/// Flush failures are logged and counted in the returned report rather than
/// aborting the run; check [`LoadReport::is_complete`].
///
/// # Examples
/// ```no_run
/// use std::path::Path;
/// use camino::Utf8Path;
/// use osmload_data::{LoadOptions, SqliteSink, load_osm_pbf};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sink = SqliteSink::create(Utf8Path::new("osm.db"))?;
/// let report = load_osm_pbf(Path::new("planet.osm.pbf"), sink.clone(), &LoadOptions::default())?;
/// println!("{report}");
/// sink.create_indexes()?;
/// # Ok(())
/// # }
/// ```
pub fn load_osm_pbf<S: RelationalSink>(
    path: &Path,
    sink: S,
    options: &LoadOptions,
) -> Result<LoadReport, OsmLoadError> {
    info!("Loading {}", path.display());
    let producer = pbf::spawn_reader(path, options.channel_capacity.max(1))?;
    let loaded = IngestDriver::new(sink, options).run(producer.entities);

    let decoded = producer
        .handle
        .join()
        .map_err(|_| OsmLoadError::ReaderThread {
            path: path.to_path_buf(),
        })?;
    let malformed = decoded.map_err(|source| OsmLoadError::Decode {
        source,
        path: path.to_path_buf(),
    })?;

    let mut report = loaded.map_err(|source| OsmLoadError::Sink { source })?;
    if malformed > 0 {
        warn!("Dropped {malformed} malformed elements");
    }
    report.record_malformed(malformed);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmload_core::test_support::RecordingSink;
    use rstest::{fixture, rstest};
    use std::io::Write;
    use tempfile::{Builder, TempDir, TempPath};

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    #[fixture]
    fn garbage_pbf() -> TempPath {
        let mut file = Builder::new()
            .suffix(".osm.pbf")
            .tempfile()
            .expect("create temp file");
        file.write_all(b"\x00\x00\x00\x0dnot a pbf blob header at all")
            .expect("write garbage");
        file.into_temp_path()
    }

    #[rstest]
    fn reports_missing_file(temp_dir: TempDir) {
        let missing = temp_dir.path().join("missing.osm.pbf");
        let err = load_osm_pbf(&missing, RecordingSink::new(), &LoadOptions::default())
            .expect_err("expected failure for missing file");
        match err {
            OsmLoadError::Open { path, .. } => assert_eq!(path, missing),
            other => panic!("expected open error, got {other:?}"),
        }
    }

    #[rstest]
    fn rejects_invalid_payload(garbage_pbf: TempPath) {
        let sink = RecordingSink::new();
        let err = load_osm_pbf(garbage_pbf.as_ref(), sink.clone(), &LoadOptions::default())
            .expect_err("expected failure when decoding invalid data");
        match err {
            OsmLoadError::Decode { path, .. } => assert_eq!(path.as_path(), &*garbage_pbf),
            other => panic!("expected decode error, got {other:?}"),
        }
        assert_eq!(sink.commits(), 0);
    }

    #[rstest]
    fn default_options_match_documented_values() {
        let options = LoadOptions::default();
        assert_eq!(options.thresholds, Thresholds::new(10_000, 1_000_000));
        assert_eq!(options.counter_reset, CounterReset::Global);
        assert_eq!(options.channel_capacity, 4096);
        assert_eq!(options.filter, ElementFilter::all());
    }
}
