//! Safe driving of a dynamically loaded `libtcc`.
//!
//! A [`Toolchain`] loads the compiler module matching the host pointer width once and
//! hands out [`CompilationContext`]s. Each context owns one foreign compilation state
//! and enforces the order libtcc expects: configure, compile, inject host symbols, then
//! relocate into memory or write an output file.
//!
//! ```no_run
//! use std::ffi::c_int;
//! use tccbind::{OutputType, Toolchain};
//!
//! extern "C" fn add(a: c_int, b: c_int) -> c_int {
//!     a + b
//! }
//!
//! # fn main() -> tccbind::BindResult<()> {
//! let toolchain = Toolchain::discover()?;
//! let mut ctx = toolchain.context()?;
//! ctx.set_error_sink(|msg| eprintln!("{msg}"))?;
//! ctx.set_output_type(OutputType::Memory)?;
//! ctx.compile_string("int add(int, int); int twice(int x) { return add(x, x); }")?;
//! ctx.inject_function("add", add as extern "C" fn(c_int, c_int) -> c_int)?;
//! ctx.relocate()?;
//! let twice: Option<extern "C" fn(c_int) -> c_int> = unsafe { ctx.resolve_function("twice")? };
//! assert_eq!(twice.map(|f| f(21)), Some(42));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
mod marshal;
pub mod pipeline;
pub mod stage;
pub mod symbols;
pub mod toolchain;

pub use config::{BindingConfig, CompileSection, ConfigError, NativeSection};
pub use context::CompilationContext;
pub use diagnostics::DiagnosticSink;
pub use error::{BindError, BindResult, ErrorKind, InjectError};
pub use pipeline::read_source;
pub use stage::{Finalized, OutputType, Stage};
pub use symbols::{InjectedSymbol, NativeFunction, SymbolKind};
pub use toolchain::Toolchain;

pub use tccbind_native as native;
pub use tccbind_native::{AbiVariant, CallingConvention, NativeLayout};
