//! Native side of the libtcc binding.
//!
//! This crate knows how to pick the binary interface for the running process, where a
//! packaged compiler lives on disk, and how to load its entry points. It never holds a
//! compilation state itself; `tccbind` owns handles and drives them through the
//! [`EntryTable`] resolved here.

pub mod abi;
pub mod entries;
pub mod error;
pub mod layout;
pub mod relay;

pub use abi::{AbiVariant, CallingConvention};
pub use entries::{load_entry_table, EntryTable, NarrowTable, TccState, WideTable, TCC_RELOCATE_AUTO};
pub use error::NativeError;
pub use layout::{install_dir, NativeLayout};
pub use relay::{relay_from_foreign, DiagnosticRelay};
