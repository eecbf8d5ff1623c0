//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides
//! through the binary.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Test fixture for configuration testing
struct ConfigFixture {
    temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relay.toml");
        Self { temp_dir, config_path }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

fn relay_cmd() -> Command {
    Command::cargo_bin("relay-worker").unwrap()
}

fn validate(fixture: &ConfigFixture) -> assert_cmd::assert::Assert {
    relay_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(fixture.path())
        .assert()
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_config_uses_defaults() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");
    validate(&fixture).success();
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
id = "relay-test-001"
name = "Test Relay"

[server]
listen_addr = "127.0.0.1:9400"
max_connections = 16
outbound_queue_size = 32
stats_interval_ms = 0

[compute]
backend = "mock"
max_threads = 2
timeout_ms = 0
default_a = [10.0, 20.0]
default_b = [1.0, 2.0]

[validation]
max_message_bytes = 1024
require_json = true
allow_binary = false
relay_results = true

[peers]
upstream = ["ws://10.0.0.2:9300", "wss://relay.example.com"]
reconnect_interval_ms = 500
max_reconnect_delay_ms = 10000
max_reconnect_attempts = 3
connect_timeout_ms = 2000

[logging]
level = "debug"
json_format = true
"#,
    );
    validate(&fixture).success();
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_mismatched_default_operands() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[compute]
default_a = [1.0, 2.0, 3.0]
default_b = [1.0]
"#,
    );
    validate(&fixture)
        .failure()
        .stderr(predicates::str::contains("differ in length"));
}

#[test]
fn test_unknown_backend() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[compute]
backend = "quantum"
"#,
    );
    validate(&fixture)
        .failure()
        .stderr(predicates::str::contains("Unknown compute backend"));
}

#[test]
fn test_invalid_upstream_scheme() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[peers]
upstream = ["http://example.com"]
"#,
    );
    validate(&fixture)
        .failure()
        .stderr(predicates::str::contains("ws://"));
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
level = "loud"
"#,
    );
    validate(&fixture)
        .failure()
        .stderr(predicates::str::contains("Invalid log level"));
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[server\nlisten_addr = ");
    validate(&fixture)
        .failure()
        .stderr(predicates::str::contains("parse"));
}

// ─────────────────────────────────────────────────────────────────
// Show / Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_custom() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
id = "custom-relay-123"

[server]
listen_addr = "127.0.0.1:9555"
"#,
    );

    relay_cmd()
        .arg("config")
        .arg("show")
        .arg("--config")
        .arg(fixture.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("custom-relay-123"))
        .stdout(predicates::str::contains("127.0.0.1:9555"));
}

#[test]
fn test_config_init_creates_file() {
    let fixture = ConfigFixture::new();
    let target = fixture.temp_dir.path().join("nested").join("relay.toml");

    relay_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(target.to_str().unwrap())
        .assert()
        .success()
        .stdout(predicates::str::contains("Configuration file created"));

    let content = fs::read_to_string(&target).unwrap();
    assert!(content.contains("[validation]"));

    // The generated file is itself valid
    relay_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(target.to_str().unwrap())
        .assert()
        .success();
}

#[test]
fn test_config_init_refuses_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    relay_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(fixture.path())
        .assert()
        .failure()
        .stderr(predicates::str::contains("already exists"));
}

#[test]
fn test_config_init_force_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("# placeholder");

    relay_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(fixture.path())
        .arg("--force")
        .assert()
        .success();

    let content = fs::read_to_string(&fixture.config_path).unwrap();
    assert!(content.contains("[server]"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_override_listen_addr() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    relay_cmd()
        .arg("config")
        .arg("show")
        .arg("--config")
        .arg(fixture.path())
        .env("RELAY_LISTEN_ADDR", "127.0.0.1:9777")
        .env("RELAY_UPSTREAM", "ws://peer-a:9300,ws://peer-b:9300")
        .assert()
        .success()
        .stdout(predicates::str::contains("127.0.0.1:9777"))
        .stdout(predicates::str::contains("ws://peer-b:9300"));
}

#[test]
fn test_env_override_is_validated() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    validate_with_env(&fixture, "RELAY_COMPUTE_BACKEND", "gpu")
        .failure()
        .stderr(predicates::str::contains("Unknown compute backend"));
}

fn validate_with_env(fixture: &ConfigFixture, key: &str, value: &str) -> assert_cmd::assert::Assert {
    relay_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(fixture.path())
        .env(key, value)
        .assert()
}
