//! Runs the `osmload` binary to check how failures reach the terminal.

use std::process::Command;

use rstest::rstest;
use tempfile::TempDir;

#[rstest]
fn missing_source_is_reported_once_on_stderr() {
    let dir = TempDir::new().expect("create temp dir");
    let missing = dir.path().join("missing.osm.pbf");
    let database = dir.path().join("osm.db");

    let output = Command::new(env!("CARGO_BIN_EXE_osmload"))
        .current_dir(dir.path())
        .env_remove("OSMLOAD_CMDS_LOAD_OSM_PBF")
        .env_remove("OSMLOAD_CMDS_LOAD_DATABASE")
        .arg("load")
        .arg("--osm-pbf")
        .arg(&missing)
        .arg("--database")
        .arg(&database)
        .output()
        .expect("run osmload");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).expect("utf-8 stderr");
    assert_eq!(stderr.matches("does not exist or is not a file").count(), 1);
    assert!(stderr.contains("osmload: osm-pbf path"), "stderr: {stderr}");
    assert!(!database.exists());
}
