use std::path::Path;

use tccbind::{OutputType, Toolchain};

use super::{link_libraries, open_context, CompileArgs};
use crate::error::CliError;

/// Compiles `file` in memory and runs its `main`. `argv[0]` is the file path.
pub fn handle_run(toolchain: &Toolchain, opts: &CompileArgs, file: &Path, args: &[String]) -> Result<i32, CliError> {
    let mut ctx = open_context(toolchain, opts)?;
    ctx.set_output_type(OutputType::Memory)?;
    link_libraries(&mut ctx, opts)?;

    let argv: Vec<String> = std::iter::once(file.display().to_string())
        .chain(args.iter().cloned())
        .collect();
    let status = ctx.run_file(file, &argv)?;
    log::info!("{} exited with status {}", file.display(), status);
    Ok(status)
}
