//! One-shot drivers over a [`CompilationContext`].

use std::fs;
use std::io;
use std::path::Path;

use crate::context::CompilationContext;
use crate::error::{BindError, BindResult};
use crate::stage::OutputType;

/// Reads a C source file, naming the file in the error.
pub fn read_source(path: impl AsRef<Path>) -> BindResult<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|source| BindError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_exists(path: &Path) -> BindResult<()> {
    if path.is_file() {
        return Ok(());
    }
    Err(BindError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::NotFound, "source file not found"),
    })
}

fn ensure_file_kind(ctx: &CompilationContext<'_>, operation: &'static str, kind: OutputType) -> BindResult<()> {
    if kind.is_file() {
        return Ok(());
    }
    Err(BindError::Postcondition {
        operation,
        stage: ctx.stage(),
        reason: "the memory output type has no file form",
    })
}

impl CompilationContext<'_> {
    /// Compiles `source` as `kind` and writes the result to `dest`.
    pub fn compile_source_to(&mut self, source: &str, kind: OutputType, dest: impl AsRef<Path>) -> BindResult<()> {
        ensure_file_kind(self, "compile_source_to", kind)?;
        self.set_output_type(kind)?;
        self.compile_string(source)?;
        self.output_file(dest)
    }

    /// Compiles the file at `path` as `kind` and writes the result to `dest`.
    pub fn compile_file_to(
        &mut self,
        path: impl AsRef<Path>,
        kind: OutputType,
        dest: impl AsRef<Path>,
    ) -> BindResult<()> {
        ensure_file_kind(self, "compile_file_to", kind)?;
        let path = path.as_ref();
        ensure_exists(path)?;
        self.set_output_type(kind)?;
        self.add_file(path)?;
        self.output_file(dest)
    }

    /// Compiles the file at `path` into memory and runs its `main` with `args`.
    pub fn run_file<S: AsRef<str>>(&mut self, path: impl AsRef<Path>, args: &[S]) -> BindResult<i32> {
        let path = path.as_ref();
        ensure_exists(path)?;
        self.set_output_type(OutputType::Memory)?;
        self.add_file(path)?;
        self.relocate()?;
        self.run(args)
    }
}
