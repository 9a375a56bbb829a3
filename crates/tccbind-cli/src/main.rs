mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};

use commands::build::{handle_build, Kind};
use commands::demo::handle_demo;
use commands::run::handle_run;
use commands::{load_toolchain, CompileArgs};

#[derive(Parser, Debug)]
#[command(name = "tccbind")]
#[command(about = "Compile, run and emit C through an embedded libtcc", long_about = None)]
struct Args {
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    #[command(flatten)]
    compile: CompileArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Compile a C file in memory and run its main
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Arguments passed to the program after its name
        #[arg(last = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Compile a C file to an executable, library, object or preprocessed source
    Build {
        /// Source file to compile
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Output file (defaults to the source name with the kind's extension)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
        /// What to produce
        #[arg(long, value_enum, default_value_t = Kind::Exe)]
        kind: Kind,
    },

    /// Inject host functions into a small program and call it
    Demo,
}

fn main() -> miette::Result<ExitCode> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let toolchain = load_toolchain(&args.compile)?;
    match args.command {
        Command::Run { file, args: program_args } => {
            let status = handle_run(&toolchain, &args.compile, &file, &program_args)?;
            // Exit codes are truncated to a byte by the platform anyway.
            Ok(ExitCode::from(status as u8))
        }
        Command::Build { file, output, kind } => {
            handle_build(&toolchain, &args.compile, &file, output, kind)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Demo => {
            handle_demo(&toolchain, &args.compile)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
