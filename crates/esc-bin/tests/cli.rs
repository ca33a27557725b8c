//! End-to-end CLI runs against the built `esc` binary.

use std::fs;
use std::process::Command;

fn esc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_esc"))
}

#[test]
fn version_prints_and_exits_zero() {
    let output = esc().arg("version").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.starts_with("esc "));
}

#[test]
fn build_without_project_file_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let output = esc().arg("build").current_dir(dir.path()).output().unwrap();
    assert!(!output.status.success());
    let text = String::from_utf8(output.stderr).unwrap();
    assert!(text.contains(".esproj"));
}

#[test]
fn new_then_build_ir_target() {
    let dir = tempfile::tempdir().unwrap();
    let status = esc()
        .args(["new", "console", "hello"])
        .current_dir(dir.path())
        .status()
        .unwrap();
    assert!(status.success());
    let project_dir = dir.path().join("hello");
    assert!(project_dir.join("hello.esproj").exists());

    let status = esc()
        .args(["build", "--target", "ir"])
        .current_dir(&project_dir)
        .status()
        .unwrap();
    assert!(status.success());
    let ir = fs::read_to_string(project_dir.join("obj/main.ir")).unwrap();
    assert!(ir.contains("function @main"));
}

#[test]
fn build_exe_links_through_arklink() {
    let dir = tempfile::tempdir().unwrap();
    esc()
        .args(["new", "console", "app"])
        .current_dir(dir.path())
        .status()
        .unwrap();
    let project_dir = dir.path().join("app");
    let status = esc()
        .args(["build", "--target", "exe"])
        .current_dir(&project_dir)
        .status()
        .unwrap();
    assert!(status.success());
    let bin_dir = project_dir.join("bin");
    let produced: Vec<_> = fs::read_dir(&bin_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .collect();
    assert_eq!(produced.len(), 1);
}

#[test]
fn check_reports_errors_with_exit_one() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("broken.es");
    fs::write(&source, "void main() { var x = missing; }").unwrap();
    let output = esc()
        .args(["check", source.to_str().unwrap()])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = String::from_utf8(output.stderr).unwrap();
    assert!(text.contains("missing"));
}

#[test]
fn clean_removes_build_directories() {
    let dir = tempfile::tempdir().unwrap();
    esc()
        .args(["new", "console", "tidy"])
        .current_dir(dir.path())
        .status()
        .unwrap();
    let project_dir = dir.path().join("tidy");
    esc()
        .args(["build", "--target", "ir"])
        .current_dir(&project_dir)
        .status()
        .unwrap();
    assert!(project_dir.join("obj").exists());

    let status = esc().arg("clean").current_dir(&project_dir).status().unwrap();
    assert!(status.success());
    assert!(!project_dir.join("obj").exists());
    assert!(!project_dir.join("bin").exists());
}
