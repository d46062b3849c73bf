use base64::{Engine as _, engine::general_purpose};
use camino::Utf8PathBuf;
use osmload_core::{
    ElementKind, Entity, User,
    test_support::{node, relation, way},
};
use rusqlite::Connection;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::{Builder, TempDir, TempPath};

/// Directory containing the encoded fixture blobs.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Decode `<stem>.osm.pbf.b64` from `dir` into a temporary `.osm.pbf` file.
pub fn decode_fixture(dir: &Path, stem: &str) -> TempPath {
    let encoded_path = dir.join(format!("{stem}.osm.pbf.b64"));
    let encoded = fs::read_to_string(&encoded_path).unwrap_or_else(|err| {
        panic!("failed to read base64 fixture {encoded_path:?}: {err}");
    });
    let cleaned: String = encoded
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let decoded = general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .unwrap_or_else(|err| {
            panic!("failed to decode base64 fixture {encoded_path:?}: {err}");
        });
    let mut tempfile = Builder::new()
        .prefix(stem)
        .suffix(".osm.pbf")
        .tempfile()
        .unwrap_or_else(|err| panic!("failed to create temporary fixture for {stem}: {err}"));
    tempfile
        .write_all(&decoded)
        .unwrap_or_else(|err| panic!("failed to write decoded fixture for {stem}: {err}"));
    tempfile
        .flush()
        .unwrap_or_else(|err| panic!("failed to flush decoded fixture for {stem}: {err}"));
    tempfile.into_temp_path()
}

/// Three nodes by distinct users, a way over the first two and a relation
/// containing the way.
pub fn sample_stream() -> Vec<Entity> {
    vec![
        Entity::Node(node(1, User::new(1, "ann"))),
        Entity::Node(node(2, User::new(2, "ben"))),
        Entity::Node(node(3, User::new(3, "cat"))),
        Entity::Way(way(10, User::new(1, "ann"), &[1, 2])),
        Entity::Relation(relation(
            20,
            User::new(2, "ben"),
            &[(10, ElementKind::Way, "outer")],
        )),
    ]
}

/// UTF-8 path for a database inside `dir`.
pub fn database_path(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("osm.db"))
        .unwrap_or_else(|path| panic!("temporary path {path:?} is not UTF-8"))
}

/// Run a single-value integer query.
pub fn query_count(path: &Path, sql: &str) -> i64 {
    let connection = Connection::open(path)
        .unwrap_or_else(|err| panic!("failed to open database {path:?}: {err}"));
    connection
        .query_row(sql, [], |row| row.get(0))
        .unwrap_or_else(|err| panic!("query {sql:?} failed: {err}"))
}

/// Write bytes that cannot be decoded as PBF into a temporary file.
pub fn invalid_pbf() -> TempPath {
    let mut tempfile = Builder::new()
        .prefix("invalid")
        .suffix(".osm.pbf")
        .tempfile()
        .unwrap_or_else(|err| panic!("failed to create temporary fixture: {err}"));
    tempfile
        .write_all(b"\x00\x00\x00\x0dnot a pbf blob header at all")
        .unwrap_or_else(|err| panic!("failed to write fixture: {err}"));
    tempfile
        .flush()
        .unwrap_or_else(|err| panic!("failed to flush fixture: {err}"));
    tempfile.into_temp_path()
}
