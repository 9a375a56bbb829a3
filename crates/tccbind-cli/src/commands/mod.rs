pub mod build;
pub mod demo;
pub mod run;

use std::path::PathBuf;

use tccbind::{BindingConfig, CompilationContext, Toolchain};

use crate::error::{parse_define, CliError};

/// Compiler flags shared by every subcommand.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct CompileArgs {
    /// Config file (default: $TCCBIND_CONFIG, then tccbind.toml next to the binary)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Add an include directory
    #[arg(short = 'I', global = true, value_name = "DIR")]
    pub include: Vec<PathBuf>,

    /// Add a library search directory
    #[arg(short = 'L', global = true, value_name = "DIR")]
    pub library_path: Vec<PathBuf>,

    /// Link a library
    #[arg(short = 'l', global = true, value_name = "LIB")]
    pub library: Vec<String>,

    /// Define a preprocessor macro
    #[arg(short = 'D', global = true, value_name = "NAME[=VALUE]")]
    pub define: Vec<String>,

    /// Extra compiler options, e.g. "-Wall -g"
    #[arg(long, global = true, value_name = "OPTIONS", allow_hyphen_values = true)]
    pub options: Option<String>,
}

pub fn load_toolchain(args: &CompileArgs) -> Result<Toolchain, CliError> {
    let config = match &args.config {
        Some(path) => {
            let mut config = BindingConfig::from_file(path)?;
            config.apply_overrides(
                std::env::var_os(tccbind::config::ROOT_ENV),
                std::env::var_os(tccbind::config::MODULE_ENV),
            );
            config
        }
        None => BindingConfig::discover()?,
    };
    let toolchain = Toolchain::load(config)?;
    log::debug!("Using {:?}", toolchain);
    Ok(toolchain)
}

/// A context with command-line flags applied and diagnostics printed to stderr.
pub fn open_context<'host>(toolchain: &Toolchain, args: &CompileArgs) -> Result<CompilationContext<'host>, CliError> {
    let mut ctx = toolchain.context()?;
    ctx.set_error_sink(|message: &str| eprintln!("{message}"))?;
    for dir in &args.include {
        ctx.add_include_path(dir)?;
    }
    for dir in &args.library_path {
        ctx.add_library_path(dir)?;
    }
    for raw in &args.define {
        let (name, value) = parse_define(raw)?;
        ctx.define_symbol(name, value)?;
    }
    if let Some(options) = &args.options {
        ctx.set_options(options)?;
    }
    Ok(ctx)
}

/// Adds `-l` libraries. Call after the output type is chosen.
pub fn link_libraries(ctx: &mut CompilationContext<'_>, args: &CompileArgs) -> Result<(), CliError> {
    for library in &args.library {
        ctx.add_library(library)?;
    }
    Ok(())
}
