use std::ffi::c_void;

use rustc_hash::FxHashMap;
use tccbind_native::CallingConvention;

/// What an injected address refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function,
    Data,
}

/// A host symbol made visible to compiled code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedSymbol {
    name: String,
    kind: SymbolKind,
    address: usize,
}

impl InjectedSymbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn address(&self) -> *const c_void {
        self.address as *const c_void
    }
}

/// Host function pointers that can be injected into a compilation context.
///
/// Implemented for `extern "C"` and `extern "system"` function pointers (safe or
/// `unsafe`) of up to eight arguments. Function items must be cast to their pointer
/// type first, e.g. `add as extern "C" fn(c_int, c_int) -> c_int`.
pub trait NativeFunction: Copy {
    const CONVENTION: CallingConvention;

    fn address(self) -> *const c_void;
}

macro_rules! native_function {
    (@conv $conv:expr, $abi:tt; $($arg:ident),*) => {
        impl<R, $($arg),*> NativeFunction for extern $abi fn($($arg),*) -> R {
            const CONVENTION: CallingConvention = $conv;

            fn address(self) -> *const c_void {
                self as *const c_void
            }
        }

        impl<R, $($arg),*> NativeFunction for unsafe extern $abi fn($($arg),*) -> R {
            const CONVENTION: CallingConvention = $conv;

            fn address(self) -> *const c_void {
                self as *const c_void
            }
        }
    };
    ($($arg:ident),*) => {
        native_function!(@conv CallingConvention::Cdecl, "C"; $($arg),*);
        native_function!(@conv CallingConvention::System, "system"; $($arg),*);
    };
}

native_function!();
native_function!(A);
native_function!(A, B);
native_function!(A, B, C);
native_function!(A, B, C, D);
native_function!(A, B, C, D, E);
native_function!(A, B, C, D, E, F);
native_function!(A, B, C, D, E, F, G);
native_function!(A, B, C, D, E, F, G, H);

/// Injection order plus a by-name index. Re-injecting a name replaces its record in
/// place.
#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    entries: Vec<InjectedSymbol>,
    index: FxHashMap<String, usize>,
}

impl SymbolTable {
    /// Records `name`, returning the address it previously had.
    pub(crate) fn record(&mut self, name: &str, kind: SymbolKind, address: *const c_void) -> Option<*const c_void> {
        let symbol = InjectedSymbol {
            name: name.to_owned(),
            kind,
            address: address as usize,
        };
        match self.index.get(name) {
            Some(&slot) => {
                let previous = std::mem::replace(&mut self.entries[slot], symbol);
                Some(previous.address())
            }
            None => {
                self.index.insert(name.to_owned(), self.entries.len());
                self.entries.push(symbol);
                None
            }
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&InjectedSymbol> {
        self.index.get(name).map(|&slot| &self.entries[slot])
    }

    pub(crate) fn as_slice(&self) -> &[InjectedSymbol] {
        &self.entries
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

/// Symbol names cross into C as NUL-terminated strings.
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('\0')
}
