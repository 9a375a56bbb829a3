//! An in-process stand-in for libtcc.
//!
//! Sources are not compiled. Comment directives drive the outcome instead:
//!
//! ```c
//! // warn: text       emit "<unit>:<line>: warning: text"
//! // error: text      emit "<unit>:<line>: error: text" and fail the unit
//! // export name      the unit defines `name` (bound with `with_export`)
//! // import name      the unit references `name`; relocation must resolve it
//! ```
#![allow(dead_code)]

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use tccbind::native::{DiagnosticRelay, EntryTable, TccState, TCC_RELOCATE_AUTO};
use tccbind::{AbiVariant, BindingConfig, Toolchain};

pub type MainFn = extern "C" fn(c_int, *mut *mut c_char) -> c_int;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Size reported by a relocation size query.
pub const RELOCATION_SIZE: c_int = 4096;

#[derive(Default)]
struct FakeHandle {
    relay: Option<NonNull<DiagnosticRelay>>,
    output_type: Option<c_int>,
    relocated: bool,
    units: usize,
    defined: Vec<String>,
    imports: Vec<String>,
    injected: FxHashMap<String, usize>,
}

impl FakeHandle {
    fn diagnose(&self, message: &str) {
        if let (Some(relay), Ok(message)) = (self.relay, CString::new(message)) {
            unsafe { relay.as_ref() }.dispatch(&message);
        }
    }
}

pub struct FakeCompiler {
    abi: AbiVariant,
    origin: PathBuf,
    fail_create: bool,
    exports: FxHashMap<String, usize>,
    import_slots: FxHashMap<String, &'static AtomicUsize>,
    calls: Mutex<Vec<String>>,
    live: AtomicUsize,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self {
            abi: AbiVariant::host().unwrap(),
            origin: PathBuf::from("fake/libtcc"),
            fail_create: false,
            exports: FxHashMap::default(),
            import_slots: FxHashMap::default(),
            calls: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
        }
    }

    pub fn with_abi(mut self, abi: AbiVariant) -> Self {
        self.abi = abi;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Binds a `// export` directive to a host address.
    pub fn with_export(mut self, name: &str, address: *const c_void) -> Self {
        self.exports.insert(name.to_owned(), address as usize);
        self
    }

    /// Relocation stores the address `name` resolved to in `slot`.
    pub fn with_import_slot(mut self, name: &str, slot: &'static AtomicUsize) -> Self {
        self.import_slots.insert(name.to_owned(), slot);
        self
    }

    pub fn into_table(self) -> Arc<FakeCompiler> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Entry names only, without arguments.
    pub fn entries_called(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.split('(').next().unwrap_or_default().to_owned())
            .collect()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries_called().iter().filter(|e| *e == entry).count()
    }

    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    unsafe fn handle<'a>(state: *mut TccState) -> &'a mut FakeHandle {
        &mut *state.cast::<FakeHandle>()
    }

    fn compile_unit(&self, handle: &mut FakeHandle, unit: &str, source: &str) -> c_int {
        let mut failed = false;
        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            let Some(directive) = line.trim().strip_prefix("//") else {
                continue;
            };
            let directive = directive.trim();
            if let Some(text) = directive.strip_prefix("warn:") {
                handle.diagnose(&format!("{unit}:{line_no}: warning: {}", text.trim()));
            } else if let Some(text) = directive.strip_prefix("error:") {
                handle.diagnose(&format!("{unit}:{line_no}: error: {}", text.trim()));
                failed = true;
            } else if let Some(name) = directive.strip_prefix("export ") {
                handle.defined.push(name.trim().to_owned());
            } else if let Some(name) = directive.strip_prefix("import ") {
                handle.imports.push(name.trim().to_owned());
            }
        }
        if failed {
            return -1;
        }
        handle.units += 1;
        0
    }

    fn lookup(&self, handle: &FakeHandle, name: &str) -> Option<usize> {
        if let Some(&address) = handle.injected.get(name) {
            return Some(address);
        }
        if handle.defined.iter().any(|d| d == name) {
            return self.exports.get(name).copied();
        }
        None
    }
}

fn text(value: &CStr) -> String {
    value.to_string_lossy().into_owned()
}

impl EntryTable for FakeCompiler {
    fn abi(&self) -> AbiVariant {
        self.abi
    }

    fn origin(&self) -> &Path {
        &self.origin
    }

    unsafe fn create(&self) -> *mut TccState {
        self.record("tcc_new()".to_owned());
        if self.fail_create {
            return ptr::null_mut();
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::<FakeHandle>::default()).cast()
    }

    unsafe fn destroy(&self, state: *mut TccState) {
        self.record("tcc_delete()".to_owned());
        self.live.fetch_sub(1, Ordering::SeqCst);
        drop(Box::from_raw(state.cast::<FakeHandle>()));
    }

    unsafe fn set_lib_path(&self, _state: *mut TccState, path: &CStr) {
        self.record(format!("tcc_set_lib_path({})", text(path)));
    }

    unsafe fn set_error_func(&self, state: *mut TccState, relay: NonNull<DiagnosticRelay>) {
        self.record("tcc_set_error_func()".to_owned());
        Self::handle(state).relay = Some(relay);
    }

    unsafe fn set_options(&self, _state: *mut TccState, options: &CStr) {
        self.record(format!("tcc_set_options({})", text(options)));
    }

    unsafe fn add_include_path(&self, _state: *mut TccState, path: &CStr) -> c_int {
        self.record(format!("tcc_add_include_path({})", text(path)));
        0
    }

    unsafe fn add_sysinclude_path(&self, _state: *mut TccState, path: &CStr) -> c_int {
        self.record(format!("tcc_add_sysinclude_path({})", text(path)));
        0
    }

    unsafe fn define_symbol(&self, _state: *mut TccState, name: &CStr, value: Option<&CStr>) {
        let value = value.map(text).unwrap_or_else(|| "NULL".to_owned());
        self.record(format!("tcc_define_symbol({}={})", text(name), value));
    }

    unsafe fn undefine_symbol(&self, _state: *mut TccState, name: &CStr) {
        self.record(format!("tcc_undefine_symbol({})", text(name)));
    }

    unsafe fn add_file(&self, state: *mut TccState, path: &CStr) -> c_int {
        let path = text(path);
        self.record(format!("tcc_add_file({path})"));
        let handle = Self::handle(state);
        match fs::read_to_string(&path) {
            Ok(source) => self.compile_unit(handle, &path, &source),
            Err(_) => {
                handle.diagnose(&format!("tcc: error: file '{path}' not found"));
                -1
            }
        }
    }

    unsafe fn compile_string(&self, state: *mut TccState, source: &CStr) -> c_int {
        self.record("tcc_compile_string()".to_owned());
        let source = text(source);
        self.compile_unit(Self::handle(state), "<string>", &source)
    }

    unsafe fn set_output_type(&self, state: *mut TccState, code: c_int) -> c_int {
        self.record(format!("tcc_set_output_type({code})"));
        Self::handle(state).output_type = Some(code);
        0
    }

    unsafe fn add_library_path(&self, _state: *mut TccState, path: &CStr) -> c_int {
        self.record(format!("tcc_add_library_path({})", text(path)));
        0
    }

    unsafe fn add_library(&self, state: *mut TccState, name: &CStr) -> c_int {
        let name = text(name);
        self.record(format!("tcc_add_library({name})"));
        if name == "missing" {
            Self::handle(state).diagnose("tcc: error: library 'missing' not found");
            return -1;
        }
        0
    }

    unsafe fn add_symbol(&self, state: *mut TccState, name: &CStr, value: *const c_void) -> c_int {
        let name = text(name);
        self.record(format!("tcc_add_symbol({name})"));
        if name == "__reserved" {
            return -1;
        }
        Self::handle(state).injected.insert(name, value as usize);
        0
    }

    unsafe fn relocate(&self, state: *mut TccState, target: *mut c_void) -> c_int {
        let mode = if target.is_null() {
            "size"
        } else if target == TCC_RELOCATE_AUTO {
            "auto"
        } else {
            "memory"
        };
        self.record(format!("tcc_relocate({mode})"));
        let handle = Self::handle(state);
        if handle.output_type != Some(1) {
            handle.diagnose("tcc: error: relocation requires memory output");
            return -1;
        }
        let mut resolved = Vec::new();
        for name in &handle.imports {
            match self.lookup(handle, name) {
                Some(address) => resolved.push((name.clone(), address)),
                None => {
                    handle.diagnose(&format!("tcc: error: undefined symbol '{name}'"));
                    return -1;
                }
            }
        }
        if target.is_null() {
            return RELOCATION_SIZE;
        }
        for (name, address) in resolved {
            if let Some(slot) = self.import_slots.get(&name) {
                slot.store(address, Ordering::SeqCst);
            }
        }
        handle.relocated = true;
        0
    }

    unsafe fn get_symbol(&self, state: *mut TccState, name: &CStr) -> *mut c_void {
        let name = text(name);
        self.record(format!("tcc_get_symbol({name})"));
        self.lookup(Self::handle(state), &name)
            .map_or(ptr::null_mut(), |address| address as *mut c_void)
    }

    unsafe fn run(&self, state: *mut TccState, argc: c_int, argv: *mut *mut c_char) -> c_int {
        self.record(format!("tcc_run({argc})"));
        let handle = Self::handle(state);
        // libtcc relocates again here and corrupts code that was already fixed up.
        if handle.relocated {
            handle.diagnose("tcc: error: tcc_run on an already relocated state");
            return -1;
        }
        match self.lookup(handle, "main") {
            Some(address) => {
                let main: MainFn = std::mem::transmute::<usize, MainFn>(address);
                main(argc, argv)
            }
            None => {
                handle.diagnose("tcc: error: undefined symbol 'main'");
                -1
            }
        }
    }

    unsafe fn output_file(&self, state: *mut TccState, path: &CStr) -> c_int {
        let path = text(path);
        self.record(format!("tcc_output_file({path})"));
        let handle = Self::handle(state);
        let contents = format!(
            "fake-tcc output_type={} units={}\n",
            handle.output_type.unwrap_or(0),
            handle.units
        );
        match fs::write(&path, contents) {
            Ok(()) => 0,
            Err(e) => {
                handle.diagnose(&format!("tcc: error: could not write '{path}': {e}"));
                -1
            }
        }
    }
}

/// A toolchain over `fake` that adds no default paths.
pub fn fake_toolchain(fake: &Arc<FakeCompiler>) -> Toolchain {
    let mut config = BindingConfig::default();
    config.native.default_paths = false;
    Toolchain::with_entries(fake.clone(), config)
}

/// Collects sink messages for later inspection.
#[derive(Clone, Default)]
pub struct Collected(Arc<Mutex<Vec<String>>>);

impl Collected {
    pub fn sink(&self) -> impl FnMut(&str) + Send + 'static {
        let out = Arc::clone(&self.0);
        move |msg: &str| out.lock().unwrap().push(msg.to_owned())
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
