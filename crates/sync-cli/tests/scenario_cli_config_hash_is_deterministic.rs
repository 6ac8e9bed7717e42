use std::io::Write;

use predicates::prelude::*;

/// `sync config-hash` over the same merged content twice must print the
/// same hash, key order in the source files notwithstanding.
#[test]
fn cli_config_hash_is_deterministic() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let path_a = dir.path().join("a.yaml");
    std::fs::File::create(&path_a)?
        .write_all(b"sync:\n  schemaVersionMax: 2\n  partitionDefault: default\n")?;

    let path_b = dir.path().join("b.yaml");
    std::fs::File::create(&path_b)?
        .write_all(b"sync:\n  partitionDefault: default\n  schemaVersionMax: 2\n")?;

    let mut cmd_a = assert_cmd::Command::cargo_bin("sync")?;
    let output_a = cmd_a.args(["config-hash", path_a.to_str().unwrap()]).output()?;

    let mut cmd_b = assert_cmd::Command::cargo_bin("sync")?;
    let output_b = cmd_b.args(["config-hash", path_b.to_str().unwrap()]).output()?;

    let hash_a = first_line(&output_a.stdout);
    let hash_b = first_line(&output_b.stdout);
    assert_eq!(hash_a, hash_b);
    assert!(hash_a.starts_with("config_hash="));

    Ok(())
}

#[test]
fn cli_config_hash_rejects_a_missing_file() {
    let mut cmd = assert_cmd::Command::cargo_bin("sync").unwrap();
    cmd.args(["config-hash", "/nonexistent/path/does/not/exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read config"));
}

fn first_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}
