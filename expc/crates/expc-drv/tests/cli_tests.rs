//! Command line surface tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn expc() -> Command {
    Command::cargo_bin("expc").expect("binary built")
}

#[test]
fn test_help_exits_zero() {
    expc()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_version_exits_zero() {
    expc()
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains("expc"));
}

#[test]
fn test_source_path_required() {
    expc().assert().failure();
}

#[test]
fn test_missing_source_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    expc()
        .arg(dir.path().join("nonexistent.exp"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_parse_error_fails() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bad.exp");
    std::fs::write(&source, "fn main( { return 0; }").unwrap();
    expc()
        .arg("-s")
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_type_error_reports_code() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bad.exp");
    std::fs::write(&source, "fn main() { const x = (1, 2); return x.5; }").unwrap();
    expc()
        .arg("-s")
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("TYPECHECK_TUPLE_INDEX_OUT_OF_BOUNDS"));
}

#[test]
fn test_emit_assembly_writes_dot_s() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.exp");
    std::fs::write(&source, "fn main() { return 0; }").unwrap();
    expc().arg("-s").arg(&source).assert().success();

    let assembly = std::fs::read_to_string(dir.path().join("prog.s")).unwrap();
    assert!(assembly.contains(".globl main"));
    assert!(assembly.contains("movq $0, %rax"));
    // -s stops before assembling
    assert!(!dir.path().join("prog.o").exists());
}

#[test]
fn test_emit_ir_writes_dot_ir() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.exp");
    std::fs::write(&source, "fn main() { const x = 1; return x; }").unwrap();
    expc().arg("-i").arg(&source).assert().success();

    let ir = std::fs::read_to_string(dir.path().join("prog.ir")).unwrap();
    assert!(ir.contains("fn main"));
    assert!(ir.contains("load"));
    assert!(ir.contains("ret"));
    assert!(!dir.path().join("prog.s").exists());
}

#[test]
fn test_output_flag_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.exp");
    let output = dir.path().join("renamed");
    std::fs::write(&source, "fn main() { return 0; }").unwrap();
    expc()
        .arg("-s")
        .arg("-o")
        .arg(&output)
        .arg(&source)
        .assert()
        .success();
    assert!(dir.path().join("renamed.s").exists());
}
