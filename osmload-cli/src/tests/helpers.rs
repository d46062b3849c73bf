//! Test helpers for staging load inputs on disk.

use crate::config::{ARG_DATABASE, ARG_OSM_PBF, LoadArgs};
use crate::{Cli, Command};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use rusqlite::Connection;
use std::fs;
use tempfile::TempDir;

/// Source file and database location inside a private temporary directory.
pub(super) struct LoadWorkspace {
    _dir: TempDir,
    osm_pbf: Utf8PathBuf,
    database: Utf8PathBuf,
}

impl LoadWorkspace {
    /// The source file holds bytes that are not a PBF blob.
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        let osm_pbf = root.join("extract.osm.pbf");
        fs::write(&osm_pbf, b"\x00\x00\x00\x0dnot a pbf blob header at all")
            .expect("write source file");
        let database = root.join("out").join("osm.db");
        Self {
            _dir: dir,
            osm_pbf,
            database,
        }
    }

    pub(super) fn osm_pbf(&self) -> &Utf8Path {
        &self.osm_pbf
    }

    pub(super) fn database(&self) -> &Utf8Path {
        &self.database
    }
}

pub(super) fn args_with_paths(workspace: &LoadWorkspace) -> LoadArgsBuilder {
    LoadArgsBuilder(vec![
        "osmload".to_owned(),
        "load".to_owned(),
        format!("--{ARG_OSM_PBF}"),
        workspace.osm_pbf().as_str().to_owned(),
        format!("--{ARG_DATABASE}"),
        workspace.database().as_str().to_owned(),
    ])
}

/// Accumulates an argument vector for `Cli::try_parse_from`.
#[derive(Debug, Clone, Default)]
pub(super) struct LoadArgsBuilder(pub(super) Vec<String>);

impl LoadArgsBuilder {
    pub(super) fn flag(mut self, name: &str, value: &str) -> Self {
        self.0.push(format!("--{name}"));
        self.0.push(value.to_owned());
        self
    }

    pub(super) fn parse(self) -> LoadArgs {
        match Cli::try_parse_from(self.0).expect("arguments parse").command {
            Command::Load(args) => args,
        }
    }
}

pub(super) fn table_names(database: &Utf8Path) -> Vec<String> {
    let connection = Connection::open(database).expect("open database");
    let mut statement = connection
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .expect("prepare table query");
    statement
        .query_map([], |row| row.get(0))
        .expect("query tables")
        .collect::<Result<_, _>>()
        .expect("collect tables")
}
