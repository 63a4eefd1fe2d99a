//! CLI integration tests for the Reframe command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Config commands read and write under an isolated config directory
//! - Invalid settings are rejected before anything starts
//! - `start` brings up a working service, in-process and with workers

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the reframe binary, isolated from the user's config.
fn reframe(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reframe").unwrap();
    cmd.current_dir(dir.path())
        .env("REFRAME_CONFIG_DIR", dir.path().join("config"))
        .env_remove("REFRAME_PORT")
        .env_remove("REFRAME_WORKERS");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let dir = TempDir::new().unwrap();
    reframe(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reframe"))
        .stdout(predicate::str::contains("image transform service"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    reframe(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("reframe"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    reframe(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("worker").not());
}

#[test]
fn test_start_help() {
    let dir = TempDir::new().unwrap();
    reframe(&dir)
        .args(["start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Start the Reframe service"))
        .stdout(predicate::str::contains("--workers"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    reframe(&dir).arg("explode").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_uses_config_dir() {
    let dir = TempDir::new().unwrap();
    let expected = dir.path().join("config").join("config.toml");
    reframe(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn test_config_init_writes_defaults_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config").join("config.toml");

    reframe(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config file"));
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[server]"));
    assert!(written.contains("max_sessions = 100"));

    std::fs::write(&path, "[server]\nport = 9100\n").unwrap();
    reframe(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "[server]\nport = 9100\n"
    );

    reframe(&dir)
        .args(["config", "init", "--force"])
        .assert()
        .success();
    assert!(std::fs::read_to_string(&path).unwrap().contains("port = 8080"));
}

#[test]
fn test_config_init_local() {
    let dir = TempDir::new().unwrap();
    reframe(&dir)
        .args(["config", "init", "--local"])
        .assert()
        .success();
    assert!(dir.path().join("reframe.toml").exists());
}

#[test]
fn test_config_show_layers_files_and_env() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("reframe.toml"),
        "[session]\nmax_sessions = 7\n",
    )
    .unwrap();

    reframe(&dir)
        .args(["config", "show"])
        .env("REFRAME_PORT", "9333")
        .assert()
        .success()
        .stdout(predicate::str::contains("reframe.toml"))
        .stdout(predicate::str::contains("max_sessions = 7"))
        .stdout(predicate::str::contains("port = 9333"));
}

#[test]
fn test_config_which_lists_sources() {
    let dir = TempDir::new().unwrap();
    reframe(&dir)
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found"))
        .stdout(predicate::str::contains("reframe config init"));
}

#[test]
fn test_start_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    reframe(&dir)
        .args(["start", "--workers", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers.count"));
}

#[test]
fn test_start_rejects_bad_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[server\nport = ").unwrap();

    reframe(&dir)
        .args(["start", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Tests
// ─────────────────────────────────────────────────────────────────────────────

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Status line of `GET /health`, if the service answers.
fn health_status(port: u16) -> Option<String> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_millis(200)).ok()?;
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .ok()?;
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .ok()?;
    let mut response = String::new();
    stream.read_to_string(&mut response).ok()?;
    response.lines().next().map(str::to_string)
}

fn wait_for_health(port: u16) -> bool {
    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline {
        if health_status(port).is_some_and(|line| line.contains("200")) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

fn spawn_start(dir: &Path, args: &[String]) -> Child {
    std::process::Command::new(assert_cmd::cargo::cargo_bin("reframe"))
        .arg("start")
        .args(args)
        .current_dir(dir)
        .env("REFRAME_CONFIG_DIR", dir.join("config"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let _ = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status();
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
#[test]
fn test_start_in_process() {
    let dir = TempDir::new().unwrap();
    let port = free_port();

    let mut child = spawn_start(
        dir.path(),
        &["--workers".into(), "0".into(), "--port".into(), port.to_string()],
    );
    let healthy = wait_for_health(port);
    terminate(&mut child);

    assert!(healthy, "in-process service never became healthy");
}

#[cfg(unix)]
#[test]
fn test_start_with_worker_process() {
    let dir = TempDir::new().unwrap();
    let port = free_port();
    let worker_port = free_port();

    let mut child = spawn_start(
        dir.path(),
        &[
            "--workers".into(),
            "1".into(),
            "--port".into(),
            port.to_string(),
            "--base-port".into(),
            worker_port.to_string(),
        ],
    );
    let healthy = wait_for_health(port);
    let worker_healthy = health_status(worker_port).is_some_and(|line| line.contains("200"));
    terminate(&mut child);

    assert!(healthy, "router never reported a healthy worker");
    assert!(worker_healthy, "worker did not answer on its own port");

    // Shutting down the supervisor takes the worker with it.
    std::thread::sleep(Duration::from_millis(500));
    assert!(health_status(worker_port).is_none());
}
