use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn forgeflow() -> Command {
    Command::cargo_bin("forgeflow").unwrap()
}

#[test]
fn runs_the_demo_pipeline_and_produces_combined_output() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "foo-data\n").unwrap();
    fs::write(dir.path().join("bar.in"), "bar-data\n").unwrap();

    forgeflow().arg("--root").arg(dir.path()).assert().success();

    let combined = fs::read_to_string(dir.path().join("combined.out")).unwrap();
    assert_eq!(combined, "FOO-DATA\nBAR-DATA\n");
}

#[test]
fn second_run_is_a_no_op_without_force() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "foo-data\n").unwrap();
    fs::write(dir.path().join("bar.in"), "bar-data\n").unwrap();

    forgeflow().arg("--root").arg(dir.path()).assert().success();
    let first_mtime = fs::metadata(dir.path().join("combined.out")).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    forgeflow().arg("--root").arg(dir.path()).assert().success();
    let second_mtime = fs::metadata(dir.path().join("combined.out")).unwrap().modified().unwrap();

    assert_eq!(first_mtime, second_mtime);
}

#[test]
fn force_reruns_even_when_up_to_date() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "foo-data\n").unwrap();
    fs::write(dir.path().join("bar.in"), "bar-data\n").unwrap();

    forgeflow().arg("--root").arg(dir.path()).assert().success();
    std::thread::sleep(std::time::Duration::from_millis(20));
    forgeflow()
        .arg("--root")
        .arg(dir.path())
        .arg("--force")
        .assert()
        .success();

    let combined = fs::read_to_string(dir.path().join("combined.out")).unwrap();
    assert_eq!(combined, "FOO-DATA\nBAR-DATA\n");
}

#[test]
fn missing_inputs_fail_with_a_nonzero_exit_code() {
    let dir = tempdir().unwrap();
    // no foo.in / bar.in written

    forgeflow()
        .arg("--root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed"));
}

#[test]
fn dry_run_leaves_no_outputs_behind() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "foo-data\n").unwrap();
    fs::write(dir.path().join("bar.in"), "bar-data\n").unwrap();

    forgeflow()
        .arg("--root")
        .arg(dir.path())
        .arg("--dry-run")
        .arg("--print-commands")
        .assert()
        .success();

    assert!(!dir.path().join("combined.out").exists());
}
