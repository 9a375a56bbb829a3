use std::any;
use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use tccbind_native::{AbiVariant, EntryTable, NativeError, TccState, TCC_RELOCATE_AUTO};

use crate::diagnostics::{ChannelBox, DiagnosticSink};
use crate::error::{BindError, BindResult, InjectError};
use crate::marshal::{c_path, c_string, Argv};
use crate::stage::{Finalized, OutputType, Stage};
use crate::symbols::{is_valid_name, InjectedSymbol, NativeFunction, SymbolKind, SymbolTable};

type BeforeCompile<'host> = Box<dyn FnMut() + Send + 'host>;

type ProgramMain = extern "C" fn(c_int, *mut *mut c_char) -> c_int;

/// One foreign compilation state and everything the host attached to it.
///
/// A context walks through [`Stage`]s in one direction: configure, compile one or more
/// units, then either relocate into memory (and look up symbols or run `main`) or write
/// an output file. Calls that do not fit the current stage fail with
/// [`BindError::Postcondition`] instead of reaching the foreign compiler.
///
/// `'host` bounds everything the context borrows from the host: data injected with
/// [`inject_data`](Self::inject_data), the error sink and the before-compile hook. The
/// borrow checker therefore keeps injected storage alive until the context is dropped.
///
/// Contexts may move between threads but are never shared; the foreign compiler is not
/// reentrant on one handle.
pub struct CompilationContext<'host> {
    state: *mut TccState,
    entries: Arc<dyn EntryTable>,
    abi: AbiVariant,
    stage: Stage,
    output_type: OutputType,
    output_type_locked: bool,
    relocate_attempted: bool,
    relocation_failed: bool,
    symbols: SymbolTable,
    before_compile: Option<BeforeCompile<'host>>,
    channel: ChannelBox<'host>,
    _host: PhantomData<&'host ()>,
}

// SAFETY: the foreign state is only touched through `&mut self`, injected data must be
// `Sync`, and the sink and hook are `Send`.
unsafe impl Send for CompilationContext<'_> {}

impl<'host> CompilationContext<'host> {
    /// Creates a fresh foreign state and registers this context's error channel with it.
    pub fn new(entries: Arc<dyn EntryTable>) -> BindResult<Self> {
        let abi = entries.abi();
        if !abi.is_host() {
            return Err(NativeError::AbiMismatch {
                requested: abi,
                host: usize::BITS,
            }
            .into());
        }

        let state = unsafe { entries.create() };
        if state.is_null() {
            return Err(BindError::CreateFailed);
        }
        let channel = ChannelBox::new();
        unsafe { entries.set_error_func(state, channel.relay()) };

        log::debug!(
            "Created compilation context ({}) from {}",
            abi,
            entries.origin().display()
        );
        Ok(Self {
            state,
            entries,
            abi,
            stage: Stage::Created,
            output_type: OutputType::default(),
            output_type_locked: false,
            relocate_attempted: false,
            relocation_failed: false,
            symbols: SymbolTable::default(),
            before_compile: None,
            channel,
            _host: PhantomData,
        })
    }

    pub fn abi(&self) -> AbiVariant {
        self.abi
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn is_disposed(&self) -> bool {
        self.stage.is_disposed()
    }

    /// Injected symbols in injection order. Empty once the context is disposed.
    pub fn injected_symbols(&self) -> &[InjectedSymbol] {
        self.symbols.as_slice()
    }

    pub fn injected_symbol(&self, name: &str) -> Option<&InjectedSymbol> {
        self.symbols.get(name)
    }

    /// Number of foreign diagnostics received so far, with or without a sink.
    ///
    /// Still readable after disposal.
    pub fn diagnostics_delivered(&self) -> usize {
        self.channel.delivered()
    }

    // ---- guards --------------------------------------------------------------

    fn violation(&self, operation: &'static str, reason: &'static str) -> BindError {
        BindError::Postcondition {
            operation,
            stage: self.stage,
            reason,
        }
    }

    fn ensure_live(&self, operation: &'static str) -> BindResult<()> {
        if self.stage.is_disposed() {
            return Err(self.violation(operation, "the foreign state has been released"));
        }
        Ok(())
    }

    fn ensure_open(&self, operation: &'static str) -> BindResult<()> {
        self.ensure_live(operation)?;
        if !self.stage.is_open() {
            return Err(self.violation(operation, "the context is already relocated or emitted"));
        }
        Ok(())
    }

    fn advance(&mut self, next: Stage) {
        if self.stage != next {
            log::trace!("Context stage {} -> {}", self.stage, next);
            self.stage = next;
        }
    }

    fn mark_configured(&mut self) {
        if self.stage == Stage::Created {
            self.advance(Stage::Configured);
        }
    }

    fn check_status(entry: &'static str, argument: impl fmt::Display, status: c_int) -> BindResult<()> {
        if status < 0 {
            log::warn!("{} rejected {} (status {})", entry, argument, status);
            return Err(BindError::Rejected {
                entry,
                argument: argument.to_string(),
                status,
            });
        }
        Ok(())
    }

    // ---- diagnostics ---------------------------------------------------------

    /// Routes every later compiler message to `sink`, replacing any previous sink.
    ///
    /// Messages are delivered synchronously during the foreign call that produced
    /// them. A panicking sink loses that one message.
    pub fn set_error_sink<F>(&mut self, sink: F) -> BindResult<()>
    where
        F: FnMut(&str) + Send + 'host,
    {
        self.ensure_live("set_error_sink")?;
        let sink: DiagnosticSink<'host> = Box::new(sink);
        self.channel.set_sink(Some(sink));
        self.mark_configured();
        Ok(())
    }

    /// Stops forwarding messages. They are still logged at debug level.
    pub fn clear_error_sink(&mut self) -> BindResult<()> {
        self.ensure_live("clear_error_sink")?;
        self.channel.set_sink(None);
        self.mark_configured();
        Ok(())
    }

    /// Runs `hook` right before each source unit is handed to the compiler.
    pub fn set_before_compile<F>(&mut self, hook: F) -> BindResult<()>
    where
        F: FnMut() + Send + 'host,
    {
        self.ensure_live("set_before_compile")?;
        self.before_compile = Some(Box::new(hook));
        self.mark_configured();
        Ok(())
    }

    // ---- configuration -------------------------------------------------------

    /// Sets the directory holding `libtcc1.a` and the compiler's own headers.
    pub fn set_lib_path(&mut self, path: impl AsRef<Path>) -> BindResult<()> {
        self.ensure_open("set_lib_path")?;
        let path = c_path(path.as_ref())?;
        unsafe { self.entries.set_lib_path(self.state, &path) };
        self.mark_configured();
        Ok(())
    }

    /// Passes command-line style options (`"-Wall -O2"`) to the compiler.
    pub fn set_options(&mut self, options: &str) -> BindResult<()> {
        self.ensure_open("set_options")?;
        let options = c_string("compiler options", options)?;
        unsafe { self.entries.set_options(self.state, &options) };
        self.mark_configured();
        Ok(())
    }

    pub fn add_include_path(&mut self, path: impl AsRef<Path>) -> BindResult<()> {
        self.ensure_open("add_include_path")?;
        let path = path.as_ref();
        let raw = c_path(path)?;
        let status = unsafe { self.entries.add_include_path(self.state, &raw) };
        Self::check_status("tcc_add_include_path", path.display(), status)?;
        self.mark_configured();
        Ok(())
    }

    pub fn add_sys_include_path(&mut self, path: impl AsRef<Path>) -> BindResult<()> {
        self.ensure_open("add_sys_include_path")?;
        let path = path.as_ref();
        let raw = c_path(path)?;
        let status = unsafe { self.entries.add_sysinclude_path(self.state, &raw) };
        Self::check_status("tcc_add_sysinclude_path", path.display(), status)?;
        self.mark_configured();
        Ok(())
    }

    pub fn add_library_path(&mut self, path: impl AsRef<Path>) -> BindResult<()> {
        self.ensure_open("add_library_path")?;
        let path = path.as_ref();
        let raw = c_path(path)?;
        let status = unsafe { self.entries.add_library_path(self.state, &raw) };
        Self::check_status("tcc_add_library_path", path.display(), status)?;
        self.mark_configured();
        Ok(())
    }

    /// Links against `name` (`"m"` for `libm`). Fixes the output type.
    pub fn add_library(&mut self, name: &str) -> BindResult<()> {
        self.ensure_open("add_library")?;
        let raw = c_string("library name", name)?;
        self.lock_output_type()?;
        let status = unsafe { self.entries.add_library(self.state, &raw) };
        Self::check_status("tcc_add_library", name, status)?;
        self.mark_configured();
        Ok(())
    }

    /// Defines a preprocessor macro; `None` defines it as `1`.
    pub fn define_symbol(&mut self, name: &str, value: Option<&str>) -> BindResult<()> {
        self.ensure_open("define_symbol")?;
        let name = c_string("macro name", name)?;
        let value = value.map(|v| c_string("macro value", v)).transpose()?;
        unsafe {
            self.entries
                .define_symbol(self.state, &name, value.as_deref())
        };
        self.mark_configured();
        Ok(())
    }

    pub fn undefine_symbol(&mut self, name: &str) -> BindResult<()> {
        self.ensure_open("undefine_symbol")?;
        let name = c_string("macro name", name)?;
        unsafe { self.entries.undefine_symbol(self.state, &name) };
        self.mark_configured();
        Ok(())
    }

    /// Chooses what compilation produces. Defaults to [`OutputType::Memory`].
    ///
    /// The type is fixed by the first compile or library addition; after that only a
    /// repeat of the same type is accepted.
    pub fn set_output_type(&mut self, output_type: OutputType) -> BindResult<()> {
        self.ensure_open("set_output_type")?;
        if self.output_type_locked {
            if output_type == self.output_type {
                return Ok(());
            }
            return Err(self.violation(
                "set_output_type",
                "the output type is fixed once compilation or linking has started",
            ));
        }
        self.output_type = output_type;
        self.mark_configured();
        Ok(())
    }

    fn lock_output_type(&mut self) -> BindResult<()> {
        if self.output_type_locked {
            return Ok(());
        }
        let status = unsafe { self.entries.set_output_type(self.state, self.output_type.code()) };
        Self::check_status("tcc_set_output_type", self.output_type, status)?;
        self.output_type_locked = true;
        log::debug!("Output type fixed to {}", self.output_type);
        Ok(())
    }

    // ---- compilation ---------------------------------------------------------

    /// Compiles a C translation unit held in memory.
    ///
    /// Failure leaves the stage as it was; the compiler's messages have already gone
    /// to the error sink by the time this returns.
    pub fn compile_string(&mut self, source: &str) -> BindResult<()> {
        self.ensure_open("compile_string")?;
        let raw = c_string("source text", source)?;
        self.before_compile_unit()?;
        let status = unsafe { self.entries.compile_string(self.state, &raw) };
        self.finish_compile("<string>".to_owned(), status)
    }

    /// Adds a file by path: C sources are compiled, objects, archives and libraries are
    /// linked.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> BindResult<()> {
        self.ensure_open("add_file")?;
        let path = path.as_ref();
        let raw = c_path(path)?;
        self.before_compile_unit()?;
        let status = unsafe { self.entries.add_file(self.state, &raw) };
        self.finish_compile(path.display().to_string(), status)
    }

    fn before_compile_unit(&mut self) -> BindResult<()> {
        self.lock_output_type()?;
        if let Some(hook) = self.before_compile.as_mut() {
            hook();
        }
        Ok(())
    }

    fn finish_compile(&mut self, unit: String, status: c_int) -> BindResult<()> {
        if status < 0 {
            log::warn!("Compilation of {} failed (status {})", unit, status);
            return Err(BindError::Compile { unit, status });
        }
        log::debug!("Compiled {}", unit);
        self.relocation_failed = false;
        self.advance(Stage::Compiled);
        Ok(())
    }

    // ---- symbol injection ----------------------------------------------------

    /// Makes a host function callable from compiled code under `name`.
    ///
    /// The function's calling convention must be usable with this context's ABI. The
    /// pointer must stay valid until the context is dropped, which holds for ordinary
    /// `fn` items.
    pub fn inject_function<F: NativeFunction>(&mut self, name: &str, function: F) -> BindResult<()> {
        self.ensure_injectable(name)?;
        let expected = self.abi.calling_convention();
        if !F::CONVENTION.is_interchangeable_with(expected) {
            return Err(InjectError::ConventionMismatch {
                name: name.to_owned(),
                abi: self.abi,
                expected,
                found: F::CONVENTION,
            }
            .into());
        }
        self.add_symbol(name, SymbolKind::Function, function.address())
    }

    /// Makes `data` visible to compiled code as the external object `name`.
    ///
    /// `data` is borrowed for the context's whole life. Foreign code only sees an
    /// address; mutation from C side is only sound through interior mutability such as
    /// atomics.
    pub fn inject_data<T>(&mut self, name: &str, data: &'host T) -> BindResult<()>
    where
        T: ?Sized + Sync,
    {
        self.ensure_injectable(name)?;
        let address = (data as *const T).cast::<c_void>();
        self.add_symbol(name, SymbolKind::Data, address)
    }

    /// Injects an arbitrary address.
    ///
    /// # Safety
    ///
    /// `address` must stay valid, and match what compiled code expects `name` to be,
    /// until the context is dropped. For functions it must use this context's calling
    /// convention.
    pub unsafe fn inject_raw(&mut self, name: &str, kind: SymbolKind, address: *const c_void) -> BindResult<()> {
        self.ensure_injectable(name)?;
        self.add_symbol(name, kind, address)
    }

    fn ensure_injectable(&self, name: &str) -> BindResult<()> {
        self.ensure_live("inject")?;
        if self.stage.is_sealed() {
            return Err(InjectError::Sealed {
                name: name.to_owned(),
                stage: self.stage,
            }
            .into());
        }
        if !is_valid_name(name) {
            return Err(InjectError::InvalidName { name: name.to_owned() }.into());
        }
        Ok(())
    }

    fn add_symbol(&mut self, name: &str, kind: SymbolKind, address: *const c_void) -> BindResult<()> {
        let raw = c_string("symbol name", name)?;
        let status = unsafe { self.entries.add_symbol(self.state, &raw, address) };
        if status < 0 {
            return Err(InjectError::Rejected {
                name: name.to_owned(),
                status,
            }
            .into());
        }
        if self.symbols.record(name, kind, address).is_some() {
            log::debug!("Re-injected {:?} symbol `{}` at {:p}", kind, name, address);
        } else {
            log::debug!("Injected {:?} symbol `{}` at {:p}", kind, name, address);
        }
        Ok(())
    }

    // ---- relocation ----------------------------------------------------------

    fn ensure_relocatable(&self, operation: &'static str) -> BindResult<()> {
        self.ensure_live(operation)?;
        match self.stage {
            Stage::Compiled => {}
            Stage::Created | Stage::Configured => {
                return Err(self.violation(operation, "nothing has been compiled"))
            }
            _ => return Err(self.violation(operation, "the context is already relocated or emitted")),
        }
        if self.output_type != OutputType::Memory {
            return Err(self.violation(operation, "relocation requires the memory output type"));
        }
        if self.relocation_failed {
            return Err(self.violation(
                operation,
                "a failed relocation must be followed by a successful compile",
            ));
        }
        Ok(())
    }

    fn relocate_to(&mut self, target: *mut c_void) -> BindResult<c_int> {
        self.relocate_attempted = true;
        let status = unsafe { self.entries.relocate(self.state, target) };
        if status < 0 {
            self.relocation_failed = true;
            log::warn!("Relocation failed (status {})", status);
            return Err(BindError::Relocation { status });
        }
        Ok(status)
    }

    /// Links the compiled units into memory owned by the foreign compiler.
    ///
    /// Every injected symbol is resolved here. On failure the context stays compiled;
    /// compile again before retrying.
    pub fn relocate(&mut self) -> BindResult<()> {
        self.ensure_relocatable("relocate")?;
        self.relocate_to(TCC_RELOCATE_AUTO)?;
        log::debug!(
            "Relocated into compiler-owned memory ({} injected symbols)",
            self.symbols.as_slice().len()
        );
        self.advance(Stage::Relocated);
        Ok(())
    }

    /// Bytes needed by [`relocate_into`](Self::relocate_into).
    ///
    /// The query runs the linker, so file emission is no longer possible afterwards.
    pub fn relocation_size(&mut self) -> BindResult<usize> {
        self.ensure_relocatable("relocation_size")?;
        let status = self.relocate_to(ptr::null_mut())?;
        Ok(status as usize)
    }

    /// Links the compiled units into caller-provided memory.
    ///
    /// # Safety
    ///
    /// `memory` must point to at least [`relocation_size`](Self::relocation_size) bytes
    /// that the caller makes executable, and must outlive every use of resolved symbols.
    pub unsafe fn relocate_into(&mut self, memory: NonNull<u8>) -> BindResult<()> {
        self.ensure_relocatable("relocate_into")?;
        self.relocate_to(memory.as_ptr().cast())?;
        log::debug!("Relocated into caller memory at {:p}", memory);
        self.advance(Stage::Relocated);
        Ok(())
    }

    // ---- finalization ----------------------------------------------------------

    /// Address of a global defined by the relocated program, if any.
    ///
    /// Injected host symbols resolve to the injected address.
    pub fn get_symbol(&mut self, name: &str) -> BindResult<Option<NonNull<c_void>>> {
        self.ensure_live("get_symbol")?;
        if !self.stage.is_relocated() {
            return Err(self.violation("get_symbol", "symbols resolve only after a successful relocation"));
        }
        let raw = c_string("symbol name", name)?;
        let address = unsafe { self.entries.get_symbol(self.state, &raw) };
        self.advance(Stage::Finalized(Finalized::Resolved));
        Ok(NonNull::new(address))
    }

    /// Looks up `name` and reinterprets it as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the compiled definition, including
    /// its calling convention. The pointer is only valid while the context is alive.
    pub unsafe fn resolve_function<F: Copy>(&mut self, name: &str) -> BindResult<Option<F>> {
        if mem::size_of::<F>() != mem::size_of::<*mut c_void>() {
            return Err(BindError::InvalidArgument {
                what: format!("type {}", any::type_name::<F>()),
                reason: "it is not a function pointer type",
            });
        }
        Ok(self
            .get_symbol(name)?
            .map(|address| mem::transmute_copy::<*mut c_void, F>(&address.as_ptr())))
    }

    /// Calls the relocated program's `main(argc, argv)` and returns its exit status.
    ///
    /// `args` become `argv[0..]` unchanged; pass a program name first if the program
    /// expects one. `tcc_run` relocates on its own and must not see a relocated state,
    /// so `main` is resolved and called directly.
    pub fn run<S: AsRef<str>>(&mut self, args: &[S]) -> BindResult<i32> {
        self.ensure_live("run")?;
        if self.output_type != OutputType::Memory {
            return Err(self.violation("run", "only memory output can be run"));
        }
        if !self.stage.is_relocated() {
            return Err(self.violation("run", "the program must be relocated first"));
        }
        let mut argv = Argv::new(args)?;
        log::debug!("Running main with {} arguments", argv.argc());
        let name = c_string("entry point", "main")?;
        let address = unsafe { self.entries.get_symbol(self.state, &name) };
        let Some(address) = NonNull::new(address) else {
            log::warn!("The relocated program defines no main");
            return Err(BindError::MissingEntryPoint { name: "main" });
        };
        let main = unsafe { mem::transmute::<*mut c_void, ProgramMain>(address.as_ptr()) };
        let status = main(argv.argc(), argv.as_mut_ptr());
        log::debug!("Program returned {}", status);
        self.advance(Stage::Finalized(Finalized::Ran));
        Ok(status)
    }

    /// Writes the compiled units to `path` as the configured output type.
    ///
    /// May be repeated to write the same output to several paths.
    pub fn output_file(&mut self, path: impl AsRef<Path>) -> BindResult<()> {
        self.ensure_live("output_file")?;
        if self.relocate_attempted {
            return Err(self.violation("output_file", "the context has been relocated"));
        }
        if !self.output_type.is_file() {
            return Err(self.violation("output_file", "the memory output type has no file form"));
        }
        match self.stage {
            Stage::Compiled | Stage::Finalized(Finalized::Emitted) => {}
            _ => return Err(self.violation("output_file", "nothing has been compiled")),
        }
        let path = path.as_ref();
        let raw = c_path(path)?;
        let status = unsafe { self.entries.output_file(self.state, &raw) };
        if status < 0 {
            log::warn!("Writing {} failed (status {})", path.display(), status);
            return Err(BindError::Emit {
                path: path.to_path_buf(),
                status,
            });
        }
        log::info!("Wrote {} to {}", self.output_type, path.display());
        self.advance(Stage::Finalized(Finalized::Emitted));
        Ok(())
    }

    // ---- disposal --------------------------------------------------------------

    /// Releases the foreign state now. Every later call fails, including a second
    /// `dispose`.
    pub fn dispose(&mut self) -> BindResult<()> {
        if self.stage.is_disposed() {
            return Err(self.violation("dispose", "the context was already disposed"));
        }
        self.release();
        self.advance(Stage::Disposed);
        Ok(())
    }

    fn release(&mut self) {
        if self.state.is_null() {
            return;
        }
        unsafe { self.entries.destroy(self.state) };
        self.state = ptr::null_mut();
        self.symbols.clear();
        self.before_compile = None;
        log::debug!("Released compilation context ({})", self.abi);
    }
}

impl Drop for CompilationContext<'_> {
    fn drop(&mut self) {
        // Fields drop after this, so the error channel outlives the foreign state.
        self.release();
    }
}

impl fmt::Debug for CompilationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationContext")
            .field("abi", &self.abi)
            .field("stage", &self.stage)
            .field("output_type", &self.output_type)
            .field("symbols", &self.symbols.as_slice().len())
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
