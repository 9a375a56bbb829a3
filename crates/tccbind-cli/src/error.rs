use std::path::PathBuf;

use miette::Diagnostic;
use tccbind::{BindError, ConfigError};
use thiserror::Error;

/// CLI-specific error type that provides rich diagnostics
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid macro definition {0:?}")]
    #[diagnostic(code(tccbind::cli::bad_define), help("Use -D NAME or -D NAME=VALUE"))]
    BadDefine(String),

    #[error("`{name}` is not defined by the compiled program")]
    #[diagnostic(code(tccbind::cli::missing_symbol))]
    MissingSymbol { name: String },

    #[error("Cannot derive an output name from {path}")]
    #[diagnostic(code(tccbind::cli::output_name), help("Pass the output path with -o"))]
    OutputName { path: PathBuf },
}

/// Splits a `-D` argument into name and optional value.
pub fn parse_define(raw: &str) -> Result<(&str, Option<&str>), CliError> {
    let (name, value) = match raw.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (raw, None),
    };
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(CliError::BadDefine(raw.to_owned()));
    }
    Ok((name, value))
}
