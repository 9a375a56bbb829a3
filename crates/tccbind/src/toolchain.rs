use std::fmt;
use std::sync::Arc;

use tccbind_native::{load_entry_table, AbiVariant, EntryTable, NativeLayout};

use crate::config::BindingConfig;
use crate::context::CompilationContext;
use crate::error::BindResult;

/// A loaded compiler module plus the settings every new context starts from.
///
/// The module is loaded once; contexts created from the same toolchain share its entry
/// table but nothing else.
#[derive(Clone)]
pub struct Toolchain {
    entries: Arc<dyn EntryTable>,
    layout: NativeLayout,
    config: BindingConfig,
}

impl Toolchain {
    /// Selects the host ABI and loads its compiler module as `config` describes.
    pub fn load(config: BindingConfig) -> BindResult<Self> {
        let abi = AbiVariant::host()?;
        let module = config.module_path(abi);
        let entries = load_entry_table(abi, &module)?;
        Ok(Self::with_entries(entries, config))
    }

    /// [`load`](Self::load) with [`BindingConfig::discover`].
    pub fn discover() -> BindResult<Self> {
        Self::load(BindingConfig::discover()?)
    }

    /// Wraps an already resolved entry table.
    pub fn with_entries(entries: Arc<dyn EntryTable>, config: BindingConfig) -> Self {
        let layout = config.layout();
        Self {
            entries,
            layout,
            config,
        }
    }

    pub fn abi(&self) -> AbiVariant {
        self.entries.abi()
    }

    pub fn layout(&self) -> &NativeLayout {
        &self.layout
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn entries(&self) -> &Arc<dyn EntryTable> {
        &self.entries
    }

    /// A new context with the layout defaults and the `[compile]` settings applied.
    pub fn context<'host>(&self) -> BindResult<CompilationContext<'host>> {
        let mut ctx = CompilationContext::new(Arc::clone(&self.entries))?;
        self.configure(&mut ctx)?;
        Ok(ctx)
    }

    fn configure(&self, ctx: &mut CompilationContext<'_>) -> BindResult<()> {
        let native = &self.config.native;
        if let Some(lib_path) = &native.lib_path {
            ctx.set_lib_path(lib_path)?;
        }
        if native.default_paths {
            for dir in self.layout.default_include_dirs() {
                ctx.add_include_path(dir)?;
            }
            ctx.add_library_path(self.layout.lib_dir())?;
        }

        let compile = &self.config.compile;
        for dir in &compile.include_paths {
            ctx.add_include_path(dir)?;
        }
        for dir in &compile.sys_include_paths {
            ctx.add_sys_include_path(dir)?;
        }
        for dir in &compile.library_paths {
            ctx.add_library_path(dir)?;
        }
        for (name, value) in &compile.defines {
            ctx.define_symbol(name, Some(value.as_str()))?;
        }
        if let Some(options) = &compile.options {
            ctx.set_options(options)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain")
            .field("abi", &self.entries.abi())
            .field("module", &self.entries.origin())
            .field("layout", &self.layout)
            .finish()
    }
}
