// CLI integration tests: page loads against a loopback counting endpoint.
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

mod common;

use common::{FakeCounter, Mode};

fn cmd(home: &Path) -> Command {
    let exe = env!("CARGO_BIN_EXE_resumecount");
    let mut command = Command::new(exe);
    command
        .env("HOME", home)
        .env_remove("RESUMECOUNT_ENDPOINT")
        .env("RUST_LOG", "off");
    command
}

fn run(home: &Path, endpoint: &str, args: &[&str]) -> Output {
    cmd(home)
        .args(["--endpoint", endpoint, "--storage-dir"])
        .arg(home.join("state"))
        .args(args)
        .output()
        .expect("run resumecount")
}

fn parse_json(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    serde_json::from_str(text.trim()).expect("valid json")
}

fn stored_entries(home: &Path, endpoint: &str) -> Value {
    let show = run(home, endpoint, &["storage", "show"]);
    assert!(show.status.success());
    parse_json(&show.stdout)["entries"].clone()
}

#[test]
fn first_visit_then_reload_keeps_the_count() {
    let server = FakeCounter::start(0);
    let home = tempfile::tempdir().expect("tempdir");

    let first = run(home.path(), server.url(), &["count", "--json"]);
    assert!(first.status.success());
    let first_json = parse_json(&first.stdout);
    assert_eq!(first_json["visitors"], "Visitors: 1");
    assert_eq!(first_json["request"], "increment");
    assert_eq!(first_json["source"], "fresh");

    let reload = run(home.path(), server.url(), &["count", "--json"]);
    assert!(reload.status.success());
    let reload_json = parse_json(&reload.stdout);
    assert_eq!(reload_json["visitors"], "Visitors: 1");
    assert_eq!(reload_json["request"], "read");

    assert_eq!(server.posts(), 1);
    assert_eq!(server.gets(), 1);

    let entries = stored_entries(home.path(), server.url());
    assert_eq!(entries["visitorCounted"], "true");
    assert_eq!(entries["visitorCount"], "1");
}

#[test]
fn visit_prints_job_title_and_visitor_line() {
    let server = FakeCounter::start(41);
    let home = tempfile::tempdir().expect("tempdir");

    let visit = run(home.path(), server.url(), &["visit", "--no-animate"]);
    assert!(visit.status.success());
    let stdout = String::from_utf8(visit.stdout).expect("utf8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["IT Specialist", "Visitors: 42"]);
}

#[test]
fn failed_first_visit_shows_default_and_retries_next_load() {
    let server = FakeCounter::start(10);
    server.set_mode(Mode::Status(500));
    let home = tempfile::tempdir().expect("tempdir");

    let failed = run(home.path(), server.url(), &["count"]);
    assert!(failed.status.success());
    assert_eq!(String::from_utf8_lossy(&failed.stdout).trim(), "Visitors: 0");
    let stderr = String::from_utf8_lossy(&failed.stderr);
    assert!(stderr.contains("\"kind\":\"fallback\""), "stderr: {stderr}");
    assert!(stored_entries(home.path(), server.url()).get("visitorCounted").is_none());

    server.set_mode(Mode::Ok);
    let retried = run(home.path(), server.url(), &["count"]);
    assert!(retried.status.success());
    assert_eq!(String::from_utf8_lossy(&retried.stdout).trim(), "Visitors: 11");
    assert_eq!(server.posts(), 2);
}

#[test]
fn mark_counted_policy_sets_flag_on_failure() {
    let server = FakeCounter::start(10);
    server.set_mode(Mode::Status(502));
    let home = tempfile::tempdir().expect("tempdir");

    let failed = run(
        home.path(),
        server.url(),
        &["--on-first-failure", "mark-counted", "count"],
    );
    assert!(failed.status.success());
    assert_eq!(
        stored_entries(home.path(), server.url())["visitorCounted"],
        "true"
    );

    server.set_mode(Mode::Ok);
    let next = run(home.path(), server.url(), &["count", "--json"]);
    assert_eq!(parse_json(&next.stdout)["request"], "read");
    assert_eq!(server.posts(), 1);
}

#[test]
fn cached_repeat_visits_skip_the_network() {
    let server = FakeCounter::start(4);
    let home = tempfile::tempdir().expect("tempdir");

    run(home.path(), server.url(), &["count"]);
    let cached = run(
        home.path(),
        server.url(),
        &["--repeat-visit", "cached", "count", "--json"],
    );
    let cached_json = parse_json(&cached.stdout);
    assert_eq!(cached_json["visitors"], "Visitors: 5");
    assert_eq!(cached_json["request"], "none");
    assert_eq!(server.gets(), 0);
}

#[test]
fn storage_clear_makes_the_next_load_count_again() {
    let server = FakeCounter::start(0);
    let home = tempfile::tempdir().expect("tempdir");

    run(home.path(), server.url(), &["count"]);
    let clear = run(home.path(), server.url(), &["storage", "clear"]);
    assert!(clear.status.success());
    assert!(parse_json(&clear.stdout)["cleared"].is_string());

    let again = run(home.path(), server.url(), &["count"]);
    assert_eq!(String::from_utf8_lossy(&again.stdout).trim(), "Visitors: 2");
    assert_eq!(server.posts(), 2);
}

#[test]
fn session_clear_deletes_the_session_file() {
    let server = FakeCounter::start(0);
    let home = tempfile::tempdir().expect("tempdir");
    let state = home.path().join("state");

    run(home.path(), server.url(), &["--scope", "session", "count"]);
    let session_files = || {
        std::fs::read_dir(&state)
            .expect("state dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("session-"))
            .count()
    };
    assert!(session_files() > 0);

    let clear = run(home.path(), server.url(), &["--scope", "session", "storage", "clear"]);
    assert!(clear.status.success());
    assert_eq!(session_files(), 0);
}

#[test]
fn clear_recovers_a_corrupt_store() {
    let server = FakeCounter::start(5);
    let home = tempfile::tempdir().expect("tempdir");
    let state = home.path().join("state");
    std::fs::create_dir_all(&state).expect("state dir");
    std::fs::write(state.join("local.json"), "{ not json").expect("write");

    let clear = run(home.path(), server.url(), &["storage", "clear"]);
    assert!(clear.status.success());

    let visit = run(home.path(), server.url(), &["count"]);
    assert_eq!(String::from_utf8_lossy(&visit.stdout).trim(), "Visitors: 6");
    assert_eq!(server.posts(), 1);
}

#[test]
fn missing_endpoint_is_a_usage_error() {
    let home = tempfile::tempdir().expect("tempdir");
    let output = cmd(home.path())
        .arg("--storage-dir")
        .arg(home.path())
        .arg("count")
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(2));
    let err = parse_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["hint"].is_string());
}

#[test]
fn type_without_animation_prints_configured_text() {
    let home = tempfile::tempdir().expect("tempdir");
    let config = home.path().join("config.json");
    std::fs::write(&config, r#"{ "typewriter": { "text": "Cloud Engineer" } }"#)
        .expect("write config");

    let output = cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["type", "--no-animate"])
        .output()
        .expect("run");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "Cloud Engineer");
}
