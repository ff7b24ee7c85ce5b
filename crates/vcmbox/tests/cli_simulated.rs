#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Output};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "vcmbox-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn vcmbox(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vcmbox"))
        .args(args)
        .env_remove("VCMBOX_DEVICE")
        .env_remove("VCMBOX_MEM_DEVICE")
        .output()
        .expect("vcmbox should run")
}

fn json_stdout(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

#[test]
fn exec_runs_increment_routine() {
    let output = vcmbox(&["--simulate", "--format", "json", "exec"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let report = json_stdout(&output);
    assert_eq!(report["backend"], "simulator");
    assert_eq!(report["result"], 2);
    assert_eq!(report["size"], 0x10000);
    assert_ne!(report["handle"], 0);
}

#[test]
fn exec_passes_argument_in_r0() {
    let output = vcmbox(&["--simulate", "--format", "raw", "exec", "--arg", "41"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "42");
}

#[test]
fn exec_loads_routine_from_file() {
    let dir = unique_temp_dir("exec-file");
    let path = dir.join("mov7.bin");
    // mov r0, #7 ; rts
    std::fs::write(&path, [0x70, 0x60, 0x5a, 0x00]).expect("payload should be writable");

    let output = vcmbox(&[
        "--simulate",
        "--format",
        "json",
        "exec",
        "--file",
        path.to_str().expect("temp path should be utf-8"),
    ]);
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let report = json_stdout(&output);
    assert_eq!(report["result"], 7);
    assert_eq!(report["payload_bytes"], 4);
}

#[test]
fn exec_rejects_empty_payload_file() {
    let dir = unique_temp_dir("exec-empty");
    let path = dir.join("empty.bin");
    std::fs::write(&path, b"").expect("payload should be writable");

    let output = vcmbox(&[
        "--simulate",
        "exec",
        "--file",
        path.to_str().expect("temp path should be utf-8"),
    ]);
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(output.status.code(), Some(60), "{output:?}");
}

#[test]
fn exec_rejects_payload_larger_than_allocation() {
    let output = vcmbox(&["--simulate", "exec", "--size", "2"]);
    assert_eq!(output.status.code(), Some(60), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("payload is 4 bytes"));
}

#[test]
fn alloc_reports_every_transition() {
    let output = vcmbox(&["--simulate", "--format", "json", "alloc", "--size", "0x1000"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let report = json_stdout(&output);
    let steps = report["steps"].as_array().expect("steps should be an array");
    let states: Vec<&str> = steps
        .iter()
        .map(|step| step["state"].as_str().expect("state should be a string"))
        .collect();
    assert_eq!(states, vec!["allocated", "locked", "unlocked", "freed"]);
    assert_eq!(report["flags"], "direct|zero");
    assert_ne!(steps[1]["value"], 0);
}

#[test]
fn doctor_passes_against_simulator() {
    let output = vcmbox(&["--simulate", "--format", "json", "doctor"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let report = json_stdout(&output);
    assert_eq!(report["overall"], "pass");
    let firmware = report["checks"]
        .as_array()
        .expect("checks should be an array")
        .iter()
        .find(|check| check["name"] == "firmware_revision")
        .expect("firmware check should be present");
    assert_eq!(firmware["status"], "pass");
}

#[test]
fn doctor_fails_without_device() {
    let dir = unique_temp_dir("doctor-missing");
    let device = dir.join("vcio");
    let mem = dir.join("mem");

    let output = vcmbox(&[
        "--format",
        "json",
        "--device",
        device.to_str().expect("temp path should be utf-8"),
        "--mem-device",
        mem.to_str().expect("temp path should be utf-8"),
        "doctor",
    ]);
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(output.status.code(), Some(30), "{output:?}");
    assert_eq!(json_stdout(&output)["overall"], "fail");
}

#[test]
fn missing_device_is_reported() {
    let dir = unique_temp_dir("exec-missing");
    let device = dir.join("vcio");

    let output = vcmbox(&[
        "--device",
        device.to_str().expect("temp path should be utf-8"),
        "exec",
    ]);
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(output.status.code(), Some(1), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn device_env_var_is_honoured() {
    let output = Command::new(env!("CARGO_BIN_EXE_vcmbox"))
        .args(["exec"])
        .env("VCMBOX_DEVICE", "/nonexistent/vcmbox/vcio")
        .output()
        .expect("vcmbox should run");

    assert_eq!(output.status.code(), Some(1), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("/nonexistent/vcmbox/vcio"));
}

#[test]
fn malformed_timeout_is_a_usage_error() {
    let output = vcmbox(&["--simulate", "--timeout", "soon", "exec"]);
    assert_eq!(output.status.code(), Some(64), "{output:?}");
}

#[test]
fn version_prints_package_version() {
    let output = vcmbox(&["version"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("vcmbox {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn extended_version_reports_build_toolchain() {
    let output = vcmbox(&["version", "--extended"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let rustc = stdout
        .lines()
        .find(|line| line.starts_with("rustc: "))
        .expect("rustc line should be present");
    assert!(rustc.starts_with("rustc: rustc "), "{rustc}");
    assert!(stdout.contains("target: "));
}
