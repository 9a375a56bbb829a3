use std::env::consts::{DLL_EXTENSION, EXE_EXTENSION};
use std::path::{Path, PathBuf};

use tccbind::{OutputType, Toolchain};

use super::{link_libraries, open_context, CompileArgs};
use crate::error::CliError;

/// File kinds `build` can produce.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Executable program
    Exe,
    /// Shared library
    Dll,
    /// Object file
    Obj,
    /// Preprocessed source
    Preprocess,
}

impl From<Kind> for OutputType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Exe => OutputType::Executable,
            Kind::Dll => OutputType::DynamicLibrary,
            Kind::Obj => OutputType::Object,
            Kind::Preprocess => OutputType::Preprocess,
        }
    }
}

impl Kind {
    fn extension(self) -> &'static str {
        match self {
            Kind::Exe => EXE_EXTENSION,
            Kind::Dll => DLL_EXTENSION,
            Kind::Obj => "o",
            Kind::Preprocess => "i",
        }
    }
}

/// `foo.c` becomes `foo`, `foo.so`, `foo.o` or `foo.i` next to the source.
pub fn default_output(file: &Path, kind: Kind) -> Result<PathBuf, CliError> {
    if file.file_stem().is_none() {
        return Err(CliError::OutputName {
            path: file.to_path_buf(),
        });
    }
    Ok(file.with_extension(kind.extension()))
}

pub fn handle_build(
    toolchain: &Toolchain,
    opts: &CompileArgs,
    file: &Path,
    output: Option<PathBuf>,
    kind: Kind,
) -> Result<(), CliError> {
    let output = match output {
        Some(path) => path,
        None => default_output(file, kind)?,
    };
    let output_type = OutputType::from(kind);

    let mut ctx = open_context(toolchain, opts)?;
    ctx.set_output_type(output_type)?;
    link_libraries(&mut ctx, opts)?;
    ctx.compile_file_to(file, output_type, &output)?;
    println!("Wrote {} {}", output_type, output.display());
    Ok(())
}
