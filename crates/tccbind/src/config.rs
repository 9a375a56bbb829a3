use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use tccbind_native::{install_dir, AbiVariant, NativeLayout};
use thiserror::Error;

/// Environment variable naming a config file to load instead of the default.
pub const CONFIG_ENV: &str = "TCCBIND_CONFIG";
/// Environment variable overriding `native.root`.
pub const ROOT_ENV: &str = "TCCBIND_ROOT";
/// Environment variable overriding `native.module`.
pub const MODULE_ENV: &str = "TCCBIND_LIB";

#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read config file {}", path.display())]
    #[diagnostic(code("TCC-CONFIG-020"))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}", path.display())]
    #[diagnostic(
        code("TCC-CONFIG-021"),
        help("See the [native] and [compile] tables accepted in tccbind.toml")
    )]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of `tccbind.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    pub native: NativeSection,
    pub compile: CompileSection,
}

/// Where the compiler module and its support files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeSection {
    /// Root of the native layout; relative paths resolve against the executable's
    /// directory.
    pub root: Option<PathBuf>,

    /// Explicit module path, bypassing the layout lookup. A bare file name is left to
    /// the system library search.
    pub module: Option<PathBuf>,

    /// Value for `tcc_set_lib_path`.
    pub lib_path: Option<PathBuf>,

    /// Add the layout's include and library directories to each new context.
    pub default_paths: bool,
}

impl Default for NativeSection {
    fn default() -> Self {
        Self {
            root: None,
            module: None,
            lib_path: None,
            default_paths: true,
        }
    }
}

/// Settings applied to every context a toolchain creates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileSection {
    pub include_paths: Vec<PathBuf>,
    pub sys_include_paths: Vec<PathBuf>,
    pub library_paths: Vec<PathBuf>,
    /// Command-line style options passed to `tcc_set_options`.
    pub options: Option<String>,
    /// Preprocessor macros as `NAME = "value"`.
    pub defines: BTreeMap<String, String>,
}

impl BindingConfig {
    pub const FILE_NAME: &'static str = "tccbind.toml";

    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text, path)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads the config the way an installed binary finds it: `$TCCBIND_CONFIG`, then
    /// `tccbind.toml` beside the executable, then defaults. Environment overrides are
    /// applied last.
    pub fn discover() -> Result<Self, ConfigError> {
        let mut config = match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => {
                let beside_exe = install_dir().join(Self::FILE_NAME);
                if beside_exe.is_file() {
                    Self::from_file(beside_exe)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(env::var_os(ROOT_ENV), env::var_os(MODULE_ENV));
        Ok(config)
    }

    /// Replaces `native.root` and `native.module` with non-empty overrides.
    pub fn apply_overrides(&mut self, root: Option<OsString>, module: Option<OsString>) {
        if let Some(root) = root.filter(|r| !r.is_empty()) {
            self.native.root = Some(PathBuf::from(root));
        }
        if let Some(module) = module.filter(|m| !m.is_empty()) {
            self.native.module = Some(PathBuf::from(module));
        }
    }

    /// The native layout, rooted at `native.root` or `<exe dir>/native`.
    pub fn layout(&self) -> NativeLayout {
        match &self.native.root {
            Some(root) if root.is_absolute() => NativeLayout::new(root),
            Some(root) => NativeLayout::new(install_dir().join(root)),
            None => NativeLayout::from_install_location(),
        }
    }

    /// The module to load for `abi`.
    pub fn module_path(&self, abi: AbiVariant) -> PathBuf {
        match &self.native.module {
            Some(module) => module.clone(),
            None => self.layout().module_path(abi),
        }
    }
}
