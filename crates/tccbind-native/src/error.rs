use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while selecting an ABI or loading the native compiler module.
#[derive(Error, Debug, Diagnostic)]
pub enum NativeError {
    #[error("Unsupported pointer width: {0} bits")]
    #[diagnostic(
        code("TCC-CONFIG-001"),
        help("Only 32-bit and 64-bit host processes can load libtcc")
    )]
    UnsupportedPointerWidth(u32),

    #[error("Native compiler module not found at {}", path.display())]
    #[diagnostic(
        code("TCC-CONFIG-002"),
        help("Place libtcc under <root>/x64 or <root>/x86, or set TCCBIND_LIB to its path")
    )]
    ModuleNotFound { path: PathBuf },

    #[error("Failed to load native compiler module {}: {source}", path.display())]
    #[diagnostic(code("TCC-CONFIG-003"))]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Native compiler module is missing entry point `{entry}`")]
    #[diagnostic(
        code("TCC-CONFIG-004"),
        help("The module must export the libtcc 0.9.27 API")
    )]
    MissingEntry {
        entry: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("Entry table for {requested} cannot be driven from a {host}-bit process")]
    #[diagnostic(code("TCC-CONFIG-005"))]
    AbiMismatch {
        requested: crate::AbiVariant,
        host: u32,
    },
}
