//! Subprocess wrappers around the system assembler and linker.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::CodeGenError;

fn run(tool: &'static str, command: &mut Command) -> Result<(), CodeGenError> {
    let status = command.status().map_err(|error| {
        if error.kind() == io::ErrorKind::NotFound {
            CodeGenError::ToolMissing { tool }
        } else {
            CodeGenError::Io(error)
        }
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(CodeGenError::ToolFailed {
            tool,
            status: status.code().unwrap_or(-1),
        })
    }
}

/// Runs `as <asm> -o <object>`.
#[derive(Debug, Default)]
pub struct Assembler;

impl Assembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(&self, assembly: &Path, object: &Path) -> Result<(), CodeGenError> {
        run(
            "as",
            Command::new("as").arg(assembly).arg("-o").arg(object),
        )
    }
}

/// Runs `ld` over the object file.
///
/// With a runtime directory configured the original link line is used:
/// `ld -o <out> -L<dir> -lexps -lexprt <object>`. Without one, the
/// emitted `_start` stub makes a plain `ld -o <out> <object>` complete.
#[derive(Debug, Default)]
pub struct Linker {
    runtime_dir: Option<PathBuf>,
}

impl Linker {
    pub fn new(runtime_dir: Option<PathBuf>) -> Self {
        Self { runtime_dir }
    }

    pub fn has_runtime(&self) -> bool {
        self.runtime_dir.is_some()
    }

    pub fn link(&self, object: &Path, output: &Path) -> Result<(), CodeGenError> {
        let mut command = Command::new("ld");
        command.arg("-o").arg(output);
        if let Some(runtime_dir) = &self.runtime_dir {
            let mut search = std::ffi::OsString::from("-L");
            search.push(runtime_dir);
            command.arg(search).arg("-lexps").arg("-lexprt");
        }
        command.arg(object);
        run("ld", &mut command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_reported() {
        let result = run(
            "as",
            &mut Command::new("expc-definitely-not-a-real-assembler"),
        );
        assert!(matches!(result, Err(CodeGenError::ToolMissing { tool: "as" })));
    }

    #[test]
    fn test_linker_runtime_configuration() {
        assert!(!Linker::new(None).has_runtime());
        assert!(Linker::new(Some(PathBuf::from("/opt/exp/lib"))).has_runtime());
    }
}
