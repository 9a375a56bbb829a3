use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use libloading::Library;

use crate::abi::AbiVariant;
use crate::error::NativeError;
use crate::relay::{relay_from_foreign, DiagnosticRelay};

/// Opaque foreign compilation state (`TCCState`).
#[repr(C)]
pub struct TccState {
    _private: [u8; 0],
}

/// `tcc_relocate` target asking the compiler to allocate and own the code memory.
pub const TCC_RELOCATE_AUTO: *mut c_void = 1usize as *mut c_void;

/// The libtcc entry points a compilation context drives.
///
/// One implementation exists per [`AbiVariant`]; a context resolves its table once and
/// dispatches every foreign call through it. Status-returning entries use the libtcc
/// conventions: `0` (or positive) is success, negative is failure.
///
/// # Safety
///
/// Every method taking a `TccState` requires a live handle obtained from `create` on
/// the same table and not yet passed to `destroy`. Calls on one handle must not race.
pub trait EntryTable: Send + Sync {
    fn abi(&self) -> AbiVariant;

    /// Where the entries came from, for logs.
    fn origin(&self) -> &Path;

    unsafe fn create(&self) -> *mut TccState;
    unsafe fn destroy(&self, state: *mut TccState);

    unsafe fn set_lib_path(&self, state: *mut TccState, path: &CStr);
    /// Registers `relay` as the opaque token of the ABI's diagnostic trampoline.
    unsafe fn set_error_func(&self, state: *mut TccState, relay: NonNull<DiagnosticRelay>);
    unsafe fn set_options(&self, state: *mut TccState, options: &CStr);
    unsafe fn add_include_path(&self, state: *mut TccState, path: &CStr) -> c_int;
    unsafe fn add_sysinclude_path(&self, state: *mut TccState, path: &CStr) -> c_int;
    unsafe fn define_symbol(&self, state: *mut TccState, name: &CStr, value: Option<&CStr>);
    unsafe fn undefine_symbol(&self, state: *mut TccState, name: &CStr);

    unsafe fn add_file(&self, state: *mut TccState, path: &CStr) -> c_int;
    unsafe fn compile_string(&self, state: *mut TccState, source: &CStr) -> c_int;
    unsafe fn set_output_type(&self, state: *mut TccState, code: c_int) -> c_int;
    unsafe fn add_library_path(&self, state: *mut TccState, path: &CStr) -> c_int;
    unsafe fn add_library(&self, state: *mut TccState, name: &CStr) -> c_int;
    unsafe fn add_symbol(&self, state: *mut TccState, name: &CStr, value: *const c_void) -> c_int;

    unsafe fn relocate(&self, state: *mut TccState, target: *mut c_void) -> c_int;
    unsafe fn get_symbol(&self, state: *mut TccState, name: &CStr) -> *mut c_void;
    /// `tcc_run` relocates by itself; never call it on a relocated state.
    unsafe fn run(&self, state: *mut TccState, argc: c_int, argv: *mut *mut c_char) -> c_int;
    unsafe fn output_file(&self, state: *mut TccState, path: &CStr) -> c_int;
}

/// Looks up one entry point and copies the function pointer out of the library.
///
/// # Safety
///
/// `T` must be the exact function pointer type of the exported symbol.
unsafe fn resolve<T: Copy>(library: &Library, entry: &'static str) -> Result<T, NativeError> {
    let symbol = library
        .get::<T>(entry.as_bytes())
        .map_err(|source| NativeError::MissingEntry { entry, source })?;
    Ok(*symbol)
}

/// Generates a loaded entry table plus its diagnostic trampoline for one calling
/// convention. Both tables come from this single entry list.
macro_rules! entry_table {
    ($table:ident, $abi:expr, extern $conv:tt, $trampoline:ident) => {
        unsafe extern $conv fn $trampoline(opaque: *mut c_void, message: *const c_char) {
            relay_from_foreign(opaque, message)
        }

        /// Entry points loaded from a libtcc module.
        pub struct $table {
            new: unsafe extern $conv fn() -> *mut TccState,
            delete: unsafe extern $conv fn(*mut TccState),
            set_lib_path: unsafe extern $conv fn(*mut TccState, *const c_char),
            set_error_func: unsafe extern $conv fn(
                *mut TccState,
                *mut c_void,
                Option<unsafe extern $conv fn(*mut c_void, *const c_char)>,
            ),
            set_options: unsafe extern $conv fn(*mut TccState, *const c_char),
            add_include_path: unsafe extern $conv fn(*mut TccState, *const c_char) -> c_int,
            add_sysinclude_path: unsafe extern $conv fn(*mut TccState, *const c_char) -> c_int,
            define_symbol: unsafe extern $conv fn(*mut TccState, *const c_char, *const c_char),
            undefine_symbol: unsafe extern $conv fn(*mut TccState, *const c_char),
            add_file: unsafe extern $conv fn(*mut TccState, *const c_char) -> c_int,
            compile_string: unsafe extern $conv fn(*mut TccState, *const c_char) -> c_int,
            set_output_type: unsafe extern $conv fn(*mut TccState, c_int) -> c_int,
            add_library_path: unsafe extern $conv fn(*mut TccState, *const c_char) -> c_int,
            add_library: unsafe extern $conv fn(*mut TccState, *const c_char) -> c_int,
            add_symbol: unsafe extern $conv fn(*mut TccState, *const c_char, *const c_void) -> c_int,
            relocate: unsafe extern $conv fn(*mut TccState, *mut c_void) -> c_int,
            get_symbol: unsafe extern $conv fn(*mut TccState, *const c_char) -> *mut c_void,
            run: unsafe extern $conv fn(*mut TccState, c_int, *mut *mut c_char) -> c_int,
            output_file: unsafe extern $conv fn(*mut TccState, *const c_char) -> c_int,
            origin: PathBuf,
            // Declared last: the function pointers above point into this library.
            _library: Library,
        }

        impl $table {
            /// Loads the module at `path` and resolves every entry point.
            pub fn load(path: &Path) -> Result<Self, NativeError> {
                let library = unsafe { Library::new(path) }.map_err(|source| {
                    NativeError::LoadFailed {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                unsafe {
                    Ok(Self {
                        new: resolve(&library, "tcc_new")?,
                        delete: resolve(&library, "tcc_delete")?,
                        set_lib_path: resolve(&library, "tcc_set_lib_path")?,
                        set_error_func: resolve(&library, "tcc_set_error_func")?,
                        set_options: resolve(&library, "tcc_set_options")?,
                        add_include_path: resolve(&library, "tcc_add_include_path")?,
                        add_sysinclude_path: resolve(&library, "tcc_add_sysinclude_path")?,
                        define_symbol: resolve(&library, "tcc_define_symbol")?,
                        undefine_symbol: resolve(&library, "tcc_undefine_symbol")?,
                        add_file: resolve(&library, "tcc_add_file")?,
                        compile_string: resolve(&library, "tcc_compile_string")?,
                        set_output_type: resolve(&library, "tcc_set_output_type")?,
                        add_library_path: resolve(&library, "tcc_add_library_path")?,
                        add_library: resolve(&library, "tcc_add_library")?,
                        add_symbol: resolve(&library, "tcc_add_symbol")?,
                        relocate: resolve(&library, "tcc_relocate")?,
                        get_symbol: resolve(&library, "tcc_get_symbol")?,
                        run: resolve(&library, "tcc_run")?,
                        output_file: resolve(&library, "tcc_output_file")?,
                        origin: path.to_path_buf(),
                        _library: library,
                    })
                }
            }
        }

        impl EntryTable for $table {
            fn abi(&self) -> AbiVariant {
                $abi
            }

            fn origin(&self) -> &Path {
                &self.origin
            }

            unsafe fn create(&self) -> *mut TccState {
                (self.new)()
            }

            unsafe fn destroy(&self, state: *mut TccState) {
                (self.delete)(state)
            }

            unsafe fn set_lib_path(&self, state: *mut TccState, path: &CStr) {
                (self.set_lib_path)(state, path.as_ptr())
            }

            unsafe fn set_error_func(&self, state: *mut TccState, relay: NonNull<DiagnosticRelay>) {
                (self.set_error_func)(state, relay.as_ptr().cast(), Some($trampoline))
            }

            unsafe fn set_options(&self, state: *mut TccState, options: &CStr) {
                (self.set_options)(state, options.as_ptr())
            }

            unsafe fn add_include_path(&self, state: *mut TccState, path: &CStr) -> c_int {
                (self.add_include_path)(state, path.as_ptr())
            }

            unsafe fn add_sysinclude_path(&self, state: *mut TccState, path: &CStr) -> c_int {
                (self.add_sysinclude_path)(state, path.as_ptr())
            }

            unsafe fn define_symbol(&self, state: *mut TccState, name: &CStr, value: Option<&CStr>) {
                let value = value.map_or(ptr::null(), CStr::as_ptr);
                (self.define_symbol)(state, name.as_ptr(), value)
            }

            unsafe fn undefine_symbol(&self, state: *mut TccState, name: &CStr) {
                (self.undefine_symbol)(state, name.as_ptr())
            }

            unsafe fn add_file(&self, state: *mut TccState, path: &CStr) -> c_int {
                (self.add_file)(state, path.as_ptr())
            }

            unsafe fn compile_string(&self, state: *mut TccState, source: &CStr) -> c_int {
                (self.compile_string)(state, source.as_ptr())
            }

            unsafe fn set_output_type(&self, state: *mut TccState, code: c_int) -> c_int {
                (self.set_output_type)(state, code)
            }

            unsafe fn add_library_path(&self, state: *mut TccState, path: &CStr) -> c_int {
                (self.add_library_path)(state, path.as_ptr())
            }

            unsafe fn add_library(&self, state: *mut TccState, name: &CStr) -> c_int {
                (self.add_library)(state, name.as_ptr())
            }

            unsafe fn add_symbol(&self, state: *mut TccState, name: &CStr, value: *const c_void) -> c_int {
                (self.add_symbol)(state, name.as_ptr(), value)
            }

            unsafe fn relocate(&self, state: *mut TccState, target: *mut c_void) -> c_int {
                (self.relocate)(state, target)
            }

            unsafe fn get_symbol(&self, state: *mut TccState, name: &CStr) -> *mut c_void {
                (self.get_symbol)(state, name.as_ptr())
            }

            unsafe fn run(&self, state: *mut TccState, argc: c_int, argv: *mut *mut c_char) -> c_int {
                (self.run)(state, argc, argv)
            }

            unsafe fn output_file(&self, state: *mut TccState, path: &CStr) -> c_int {
                (self.output_file)(state, path.as_ptr())
            }
        }
    };
}

entry_table!(NarrowTable, AbiVariant::Narrow, extern "C", narrow_diagnostic_trampoline);
entry_table!(WideTable, AbiVariant::Wide, extern "system", wide_diagnostic_trampoline);

/// Loads the entry table for `abi` from the module at `path`.
///
/// This is the only place the two tables are told apart; everything downstream holds
/// the resolved `dyn EntryTable`.
pub fn load_entry_table(abi: AbiVariant, path: &Path) -> Result<Arc<dyn EntryTable>, NativeError> {
    if !abi.is_host() {
        return Err(NativeError::AbiMismatch {
            requested: abi,
            host: usize::BITS,
        });
    }
    if !path.is_file() && path.components().count() > 1 {
        return Err(NativeError::ModuleNotFound {
            path: path.to_path_buf(),
        });
    }

    log::debug!("Loading libtcc entry table ({}) from {}", abi, path.display());
    let table: Arc<dyn EntryTable> = match abi {
        AbiVariant::Narrow => Arc::new(NarrowTable::load(path)?),
        AbiVariant::Wide => Arc::new(WideTable::load(path)?),
    };
    log::info!("Loaded libtcc entry table ({}) from {}", abi, path.display());
    Ok(table)
}
