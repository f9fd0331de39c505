//! End-to-end pipeline tests.
//!
//! Every scenario is checked against the generated assembly. When the
//! system assembler and linker are present the executable is also built
//! and run, and its exit status compared with evaluating the source by
//! hand.

use std::path::Path;
use std::process::Command;

use assert_cmd::Command as AssertCommand;

fn compile_to_assembly(dir: &Path, source: &str) -> String {
    let source_path = dir.join("prog.exp");
    std::fs::write(&source_path, source).unwrap();
    AssertCommand::cargo_bin("expc")
        .unwrap()
        .arg("-s")
        .arg(&source_path)
        .assert()
        .success();
    std::fs::read_to_string(dir.join("prog.s")).unwrap()
}

fn have_binutils() -> bool {
    let probe = |tool: &str| {
        Command::new(tool)
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    };
    probe("as") && probe("ld")
}

/// Build an executable and return its exit code.
fn run_executable(dir: &Path, source: &str) -> i32 {
    let source_path = dir.join("prog.exp");
    std::fs::write(&source_path, source).unwrap();
    AssertCommand::cargo_bin("expc")
        .unwrap()
        .arg(&source_path)
        .env_remove(expc_drv::RUNTIME_DIR_VAR)
        .assert()
        .success();
    let status = Command::new(dir.join("prog")).status().unwrap();
    status.code().unwrap()
}

#[test]
fn test_return_zero() {
    let dir = tempfile::tempdir().unwrap();
    let asm = compile_to_assembly(dir.path(), "fn main() { return 0; }");
    assert!(asm.contains("movq $0, %rax"));
    assert!(asm.contains("pushq %rbp"));
    assert!(asm.contains(".section .note.GNU-stack"));
}

#[test]
fn test_return_255() {
    let dir = tempfile::tempdir().unwrap();
    let asm = compile_to_assembly(dir.path(), "fn main() { return 255; }");
    assert!(asm.contains("movq $255, %rax"));
}

#[test]
fn test_addition_of_locals() {
    let dir = tempfile::tempdir().unwrap();
    let asm = compile_to_assembly(
        dir.path(),
        "fn main() { const x = 1; const y = 1; return x + y; }",
    );
    assert!(asm.contains("addq"));
}

#[test]
fn test_division_of_locals() {
    let dir = tempfile::tempdir().unwrap();
    let asm = compile_to_assembly(
        dir.path(),
        "fn main() { const x = 9; const y = 3; return x / y; }",
    );
    assert!(asm.contains("idivq"));
    assert!(asm.contains("movq $0, %rdx"));
}

#[test]
fn test_precedence_folds() {
    let dir = tempfile::tempdir().unwrap();
    let asm = compile_to_assembly(dir.path(), "fn main() { return 6 + 2 * 3; }");
    assert!(asm.contains("movq $12, %rax"));
}

#[test]
fn test_call_and_abi() {
    let dir = tempfile::tempdir().unwrap();
    let asm = compile_to_assembly(
        dir.path(),
        "fn f() { return 25; } fn main() { return f() + f(); }",
    );
    assert_eq!(asm.matches("call f").count(), 2);
    let f = asm.find("f:").unwrap();
    let main = asm.find("main:").unwrap();
    assert!(f < main, "declaration order preserved");
}

#[test]
fn test_tuple_subscript_and_multiply() {
    let dir = tempfile::tempdir().unwrap();
    let asm = compile_to_assembly(
        dir.path(),
        "fn main() { const x = (2, 4); return x.0 * x.1; }",
    );
    assert!(asm.contains("movq $2, -16(%rbp)"));
    assert!(asm.contains("movq $4, -8(%rbp)"));
    assert!(asm.contains("imulq"));
}

#[test]
fn test_formal_arguments_via_sysv() {
    let dir = tempfile::tempdir().unwrap();
    let asm = compile_to_assembly(
        dir.path(),
        "fn f(x: i64, y: i64) { return x + y; } fn main() { return f(1, 2); }",
    );
    assert!(asm.contains("movq $1, %rdi"));
    assert!(asm.contains("movq $2, %rsi"));
}

#[test]
fn test_executables_exit_codes() {
    if !have_binutils() {
        eprintln!("skipping: as/ld not available");
        return;
    }

    let scenarios: &[(&str, i32)] = &[
        ("fn main() { return 0; }", 0),
        ("fn main() { return 255; }", 255),
        ("fn main() { const x = 1; const y = 1; return x + y; }", 2),
        ("fn main() { const x = 9; const y = 3; return x / y; }", 3),
        ("fn main() { return 6 + 2 * 3; }", 12),
        ("fn f() { return 25; } fn main() { return f() + f(); }", 50),
        ("fn main() { const x = (2, 4); return x.0 * x.1; }", 8),
        (
            "fn f(x: i64, y: i64) { return x + y; } fn main() { return f(1, 2); }",
            3,
        ),
    ];

    for (source, expected) in scenarios {
        let dir = tempfile::tempdir().unwrap();
        let actual = run_executable(dir.path(), source);
        assert_eq!(actual, *expected, "source: {source}");
    }
}

#[test]
fn test_executable_intermediates_cleaned() {
    if !have_binutils() {
        eprintln!("skipping: as/ld not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("prog.exp");
    std::fs::write(&source_path, "fn main() { return 0; }").unwrap();
    AssertCommand::cargo_bin("expc")
        .unwrap()
        .arg(&source_path)
        .env_remove(expc_drv::RUNTIME_DIR_VAR)
        .assert()
        .success();
    assert!(dir.path().join("prog").exists());
    assert!(!dir.path().join("prog.s").exists());
    assert!(!dir.path().join("prog.o").exists());
}

#[test]
fn test_object_only() {
    if !have_binutils() {
        eprintln!("skipping: as/ld not available");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("prog.exp");
    std::fs::write(&source_path, "fn main() { return 0; }").unwrap();
    AssertCommand::cargo_bin("expc")
        .unwrap()
        .arg("-c")
        .arg(&source_path)
        .assert()
        .success();
    assert!(dir.path().join("prog.o").exists());
    assert!(!dir.path().join("prog").exists());
}
