//! Command-line tests for the `nbrun` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn write_notebook(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("input.ipynb");
    let json = serde_json::json!({
        "nbformat": 3,
        "nbformat_minor": 0,
        "metadata": { "name": "" },
        "worksheets": [{
            "cells": [{
                "cell_type": "code",
                "input": ["print('hi')"],
                "language": "python",
                "outputs": []
            }],
            "metadata": {}
        }]
    });
    std::fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();
    path
}

#[test]
fn test_help_lists_run() {
    Command::cargo_bin("nbrun")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_run_help_lists_flags() {
    Command::cargo_bin("nbrun")
        .unwrap()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--skip-exceptions"))
        .stdout(predicate::str::contains("--autosave"));
}

#[test]
fn test_missing_notebook_fails() {
    let temp = tempfile::TempDir::new().unwrap();

    Command::cargo_bin("nbrun")
        .unwrap()
        .arg("run")
        .arg(temp.path().join("missing.ipynb"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.ipynb"));
}

#[test]
fn test_output_conflicts_with_overwrite() {
    let temp = tempfile::TempDir::new().unwrap();
    let input = write_notebook(temp.path());

    Command::cargo_bin("nbrun")
        .unwrap()
        .arg("run")
        .arg(&input)
        .args(["--overwrite", "--output", "out.ipynb"])
        .assert()
        .failure();
}

#[test]
fn test_unknown_kernel_fails_with_hint() {
    let temp = tempfile::TempDir::new().unwrap();
    let input = write_notebook(temp.path());

    Command::cargo_bin("nbrun")
        .unwrap()
        .arg("run")
        .arg(&input)
        .arg("--kernel")
        .arg(temp.path().join("no-such-kernel"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to spawn kernel"))
        .stderr(predicate::str::contains("NBRUN_KERNEL"));
}
