use std::fs;
use std::time::Duration;

use assert_cmd::Command;
use tempfile::tempdir;

fn forgeflow() -> Command {
    Command::cargo_bin("forgeflow").unwrap()
}

#[test]
fn touch_refreshes_output_mtime_without_running_commands() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "foo-data\n").unwrap();
    fs::write(dir.path().join("bar.in"), "bar-data\n").unwrap();

    forgeflow().arg("--root").arg(dir.path()).assert().success();
    let combined = dir.path().join("combined.out");
    let before = fs::read_to_string(&combined).unwrap();
    let mtime_before = fs::metadata(&combined).unwrap().modified().unwrap();

    std::thread::sleep(Duration::from_millis(20));
    fs::write(dir.path().join("foo.in"), "changed\n").unwrap();

    forgeflow()
        .arg("--root")
        .arg(dir.path())
        .arg("--touch")
        .assert()
        .success();

    let mtime_after = fs::metadata(&combined).unwrap().modified().unwrap();
    assert!(mtime_after > mtime_before);
    // `--touch` never runs a command, so the file content is untouched.
    assert_eq!(fs::read_to_string(&combined).unwrap(), before);
}

#[test]
fn delete_outputs_removes_every_declared_output() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "foo-data\n").unwrap();
    fs::write(dir.path().join("bar.in"), "bar-data\n").unwrap();

    forgeflow().arg("--root").arg(dir.path()).assert().success();
    assert!(dir.path().join("foo.out").exists());
    assert!(dir.path().join("combined.out").exists());

    forgeflow()
        .arg("--root")
        .arg(dir.path())
        .arg("--delete-outputs")
        .assert()
        .success();

    assert!(!dir.path().join("foo.out").exists());
    assert!(!dir.path().join("bar.out").exists());
    assert!(!dir.path().join("combined.out").exists());
}

#[test]
fn multithreaded_run_still_produces_correct_output() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "foo-data\n").unwrap();
    fs::write(dir.path().join("bar.in"), "bar-data\n").unwrap();

    forgeflow()
        .arg("--root")
        .arg(dir.path())
        .arg("--threads")
        .arg("4")
        .assert()
        .success();

    let combined = fs::read_to_string(dir.path().join("combined.out")).unwrap();
    assert_eq!(combined, "FOO-DATA\nBAR-DATA\n");
}
