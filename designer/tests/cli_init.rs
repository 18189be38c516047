//! CLI tests for `designer init`, `designer ladder` and `designer run` input
//! errors. Spawns the designer binary; none of these reach the network.

use std::fs;
use std::process::Command;

use designer::exit_codes;
use designer::io::config::load_config;

fn designer() -> Command {
    Command::new(env!("CARGO_BIN_EXE_designer"))
}

#[test]
fn init_writes_loadable_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("designer.toml");

    let status = designer()
        .arg("init")
        .arg("--config")
        .arg(&path)
        .status()
        .expect("designer init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&path).expect("load written config");
    assert_eq!(cfg.max_concurrency, 10);
    assert_eq!(cfg.parameters.get("SPAN_INTRON"), Some("on"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("designer.toml");
    fs::write(&path, "max_concurrency = 2\n").expect("seed config");

    let status = designer()
        .args(["init", "--config"])
        .arg(&path)
        .status()
        .expect("designer init");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert_eq!(
        fs::read_to_string(&path).expect("read"),
        "max_concurrency = 2\n"
    );

    let status = designer()
        .args(["init", "--force", "--config"])
        .arg(&path)
        .status()
        .expect("designer init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load").max_concurrency, 10);
}

#[test]
fn ladder_prints_both_branches() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = designer()
        .args(["ladder", "--config"])
        .arg(temp.path().join("absent.toml"))
        .output()
        .expect("designer ladder");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1. strict"));
    assert!(stdout.contains("GC_CLAMP: 2 -> 1"));
    assert!(stdout.contains("intronless_Probable_Dimers [low confidence]"));
}

#[test]
fn run_with_missing_input_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = designer()
        .arg("run")
        .arg("--input")
        .arg(temp.path().join("absent.csv"))
        .arg("--output")
        .arg(temp.path().join("out"))
        .arg("--config")
        .arg(temp.path().join("designer.toml"))
        .output()
        .expect("designer run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.csv"));
}

#[test]
fn run_rejects_zero_jobs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input = temp.path().join("targets.txt");
    fs::write(&input, "NM_000001\n").expect("write targets");

    let output = designer()
        .arg("run")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(temp.path().join("out"))
        .arg("--config")
        .arg(temp.path().join("designer.toml"))
        .args(["--jobs", "0"])
        .output()
        .expect("designer run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_concurrency"));
    assert!(!temp.path().join("out").exists());
}
