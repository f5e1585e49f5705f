//! Integration tests for the `wavedbg` binary.
//!
//! Each test runs the binary with `XDG_CONFIG_HOME` pointed at a temporary
//! directory so no real config file is read or written.

use std::path::Path;
use std::process::{Command, Output};

// -----------------------------------------------------------------------
// Test helpers
// -----------------------------------------------------------------------

fn wavedbg(config_home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wavedbg"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("WAVEDBG_PRECISE_MEMORY")
        .env_remove("WAVEDBG_LIB_LOG_LEVEL")
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run wavedbg")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const SCENARIO: &str = r#"
[[process]]
pid = 100
waves = 2
runtime = "loaded_success"

[[step]]
action = "attach"
pid = 100

[[step]]
action = "update-threads"

[[step]]
action = "wave-stop"
pid = 100
wave = 1
reasons = ["MEMORY_VIOLATION"]

[[step]]
action = "notify"

[[step]]
action = "wait"

[[step]]
action = "resume"
pid = 100
wave = 1
signal = "SIGSEGV"

[[step]]
action = "detach"
pid = 100
"#;

// -----------------------------------------------------------------------
// init / config
// -----------------------------------------------------------------------

#[test]
fn init_writes_config_and_refuses_to_overwrite() {
    let tmp = tempfile::TempDir::new().unwrap();

    let first = wavedbg(tmp.path(), &["init"]);
    assert!(first.status.success(), "init failed: {}", stderr(&first));
    let path = tmp.path().join("wavedbg").join("config.toml");
    assert!(path.exists());

    let second = wavedbg(tmp.path(), &["init"]);
    assert!(!second.status.success());
    assert!(stderr(&second).contains("--force"));

    let forced = wavedbg(tmp.path(), &["init", "--force"]);
    assert!(forced.status.success());
}

#[test]
fn config_reports_the_resolution_chain() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("wavedbg");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.toml"),
        "[adapter]\nprecise_memory = true\nlibrary_log_level = \"info\"\n",
    )
    .unwrap();

    let from_file = stdout(&wavedbg(tmp.path(), &["config"]));
    assert!(from_file.contains("precise_memory = true"), "{from_file}");
    assert!(from_file.contains("library_log_level = info"), "{from_file}");

    let overridden = stdout(&wavedbg(
        tmp.path(),
        &["--precise-memory", "false", "--lib-log-level", "trace", "config"],
    ));
    assert!(overridden.contains("precise_memory = false"), "{overridden}");
    assert!(overridden.contains("library_log_level = trace"), "{overridden}");
}

#[test]
fn config_without_a_file_uses_defaults() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = stdout(&wavedbg(tmp.path(), &["config"]));
    assert!(out.contains("not found"), "{out}");
    assert!(out.contains("library_log_level = warning"), "{out}");
}

// -----------------------------------------------------------------------
// version / completions
// -----------------------------------------------------------------------

#[test]
fn version_names_the_supported_range() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = stdout(&wavedbg(tmp.path(), &["version"]));
    assert!(out.contains("supported"), "{out}");
    assert!(out.contains("requires 0.76"), "{out}");
}

#[test]
fn completions_are_generated() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = wavedbg(tmp.path(), &["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("wavedbg"));
}

// -----------------------------------------------------------------------
// replay
// -----------------------------------------------------------------------

#[test]
fn replay_prints_one_line_per_step() {
    let tmp = tempfile::TempDir::new().unwrap();
    let scenario = tmp.path().join("scenario.toml");
    std::fs::write(&scenario, SCENARIO).unwrap();

    let output = wavedbg(tmp.path(), &["replay", scenario.to_str().unwrap()]);
    assert!(output.status.success(), "replay failed: {}", stderr(&output));

    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 7, "{out}");
    assert!(lines[0].starts_with("[1] attach: attached as"), "{out}");
    assert_eq!(lines[1], "[2] update-threads: 2 wave thread(s)");
    assert_eq!(lines[3], "[4] notify: 1 notifier(s) handled");
    assert!(lines[4].contains("SIGSEGV"), "{out}");
    assert_eq!(lines[6], "[7] detach: detached");
}

#[test]
fn replay_json_emits_one_object_per_step() {
    let tmp = tempfile::TempDir::new().unwrap();
    let scenario = tmp.path().join("scenario.toml");
    std::fs::write(&scenario, SCENARIO).unwrap();

    let output = wavedbg(tmp.path(), &["replay", "--json", scenario.to_str().unwrap()]);
    assert!(output.status.success(), "replay failed: {}", stderr(&output));

    let steps: Vec<serde_json::Value> = stdout(&output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is JSON"))
        .collect();
    assert_eq!(steps.len(), 7);
    assert_eq!(steps[4]["action"], "wait");
    assert_eq!(steps[4]["ok"], true);
    assert_eq!(steps[5]["step"], 6);
}

#[test]
fn replay_of_a_missing_scenario_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = wavedbg(tmp.path(), &["replay", "/nonexistent/scenario.toml"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to read scenario"));
}
