//! Integration tests for the mailsync binary
//!
//! These run the built binary and check:
//! - The demo converges in its first pass and carries the flag change in its second
//! - Config file errors are reported
//! - `watch` stops on its own and leaves baseline files behind

use std::process::Command;
use tempfile::TempDir;

fn mailsync() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mailsync"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_demo_json_converges() {
    let output = mailsync()
        .args(["--log-level", "error", "demo", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);

    let stdout = String::from_utf8(output.stdout).unwrap();
    let passes: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(passes.len(), 2);

    for pass in &passes {
        assert_eq!(pass["converged"], true);
        assert_eq!(pass["outcome"], "Committed");
    }

    let left_store = passes[0]["snapshot"]["left"]["store"].as_array().unwrap();
    assert_eq!(left_store.len(), 3);
}

#[test]
fn test_demo_text_output() {
    let output = mailsync()
        .args(["--log-level", "error", "demo"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("== pass 1 (Committed) =="));
    assert!(stdout.contains("== pass 2 (Committed) =="));
    assert!(stdout.contains("left store:"));
    assert_eq!(stdout.matches("converged: true").count(), 2);
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = mailsync()
        .args(["--config"])
        .arg(dir.path().join("absent.toml"))
        .arg("demo")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("loading config"));
}

#[test]
fn test_watch_stops_and_persists_baselines() {
    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join("state");
    let config = dir.path().join("mailsync.toml");
    std::fs::write(
        &config,
        format!(
            "[baseline]\nstate_dir = {:?}\n\n[logging]\nlevel = \"warn\"\n",
            state_dir
        ),
    )
    .unwrap();

    let output = mailsync()
        .arg("--config")
        .arg(&config)
        .args(["watch", "--interval", "1", "--stop-after", "2"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);

    for name in ["left.own", "left.peer", "right.own", "right.peer"] {
        assert!(state_dir.join(format!("{}.baseline", name)).exists());
    }
}
