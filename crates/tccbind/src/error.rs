use std::ffi::c_int;
use std::path::PathBuf;

use miette::Diagnostic;
use tccbind_native::{AbiVariant, CallingConvention, NativeError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::stage::Stage;

/// Broad category of a [`BindError`], for callers that branch on recoverability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unsupported host, missing module or entry, handle creation, bad config file.
    Configuration,
    /// The foreign compiler rejected a source unit.
    Compile,
    /// A symbol could not be injected.
    Injection,
    /// The foreign linker failed to relocate, or the relocated program has no `main`.
    Relocation,
    /// The foreign compiler failed to write an output file.
    Emission,
    /// An operation was called out of order or after disposal.
    Postcondition,
    /// An argument cannot cross the boundary (interior NUL, unrepresentable path).
    InvalidArgument,
    /// Reading a source file failed.
    Io,
}

/// Errors surfaced by compilation contexts and toolchains.
#[derive(Error, Debug, Diagnostic)]
pub enum BindError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Native(#[from] NativeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("libtcc could not create a compilation state")]
    #[diagnostic(code("TCC-CONFIG-010"), help("tcc_new returned NULL; the process is out of memory"))]
    CreateFailed,

    #[error("`{entry}` rejected {argument:?} with status {status}")]
    #[diagnostic(code("TCC-CONFIG-011"))]
    Rejected {
        entry: &'static str,
        argument: String,
        status: c_int,
    },

    #[error("Compilation of {unit} failed with status {status}")]
    #[diagnostic(
        code("TCC-COMPILE-001"),
        help("Compiler messages were delivered to the context's error sink")
    )]
    Compile { unit: String, status: c_int },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Injection(#[from] InjectError),

    #[error("Relocation failed with status {status}")]
    #[diagnostic(
        code("TCC-RELOC-001"),
        help("Unresolved symbols are reported to the error sink; recompile before relocating again")
    )]
    Relocation { status: c_int },

    #[error("The relocated program defines no `{name}`")]
    #[diagnostic(
        code("TCC-RUN-001"),
        help("Define `int main(int argc, char **argv)` in one of the compiled units")
    )]
    MissingEntryPoint { name: &'static str },

    #[error("Writing {} failed with status {status}", path.display())]
    #[diagnostic(code("TCC-EMIT-001"))]
    Emit { path: PathBuf, status: c_int },

    #[error("`{operation}` is not allowed while the context is {stage}: {reason}")]
    #[diagnostic(code("TCC-ORDER-001"))]
    Postcondition {
        operation: &'static str,
        stage: Stage,
        reason: &'static str,
    },

    #[error("{what} cannot be passed to libtcc: {reason}")]
    #[diagnostic(code("TCC-ARG-001"))]
    InvalidArgument { what: String, reason: &'static str },

    #[error("Cannot read source file {}", path.display())]
    #[diagnostic(code("TCC-IO-001"))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BindError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BindError::Native(_) | BindError::Config(_) | BindError::CreateFailed | BindError::Rejected { .. } => {
                ErrorKind::Configuration
            }
            BindError::Compile { .. } => ErrorKind::Compile,
            BindError::Injection(_) => ErrorKind::Injection,
            BindError::Relocation { .. } | BindError::MissingEntryPoint { .. } => ErrorKind::Relocation,
            BindError::Emit { .. } => ErrorKind::Emission,
            BindError::Postcondition { .. } => ErrorKind::Postcondition,
            BindError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            BindError::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn is_postcondition_violation(&self) -> bool {
        self.kind() == ErrorKind::Postcondition
    }
}

/// Reasons a symbol injection was refused.
#[derive(Error, Debug, Diagnostic)]
pub enum InjectError {
    #[error("Cannot inject `{name}`: the context is already {stage}")]
    #[diagnostic(
        code("TCC-INJECT-001"),
        help("Symbols must be injected before relocation or file emission")
    )]
    Sealed { name: String, stage: Stage },

    #[error("{name:?} is not a valid symbol name")]
    #[diagnostic(code("TCC-INJECT-002"), help("Symbol names must be non-empty and free of NUL bytes"))]
    InvalidName { name: String },

    #[error("`{name}` is an {found} function but the context ({abi}) calls {expected}")]
    #[diagnostic(code("TCC-INJECT-003"))]
    ConventionMismatch {
        name: String,
        abi: AbiVariant,
        expected: CallingConvention,
        found: CallingConvention,
    },

    #[error("libtcc rejected symbol `{name}` with status {status}")]
    #[diagnostic(code("TCC-INJECT-004"))]
    Rejected { name: String, status: c_int },
}

pub type BindResult<T> = Result<T, BindError>;
