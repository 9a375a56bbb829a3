use std::env;
use std::path::{Path, PathBuf};

use crate::abi::AbiVariant;

/// Directory layout of a packaged native compiler.
///
/// ```text
/// <root>/x86/libtcc.dll      narrow module
/// <root>/x64/libtcc.dll      wide module
/// <root>/lib                 library search path (libtcc1.a, import libs)
/// <root>/libtcc              compiler-internal headers
/// <root>/include             public headers
/// <root>/include/winapi      platform API headers
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeLayout {
    root: PathBuf,
}

impl NativeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `native/` next to the running executable, or `./native` when the executable
    /// location cannot be determined.
    pub fn from_install_location() -> Self {
        Self::new(install_dir().join("native"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name of the compiler module on this platform.
    pub fn module_file_name() -> String {
        format!("libtcc{}", env::consts::DLL_SUFFIX)
    }

    pub fn module_path(&self, abi: AbiVariant) -> PathBuf {
        self.root.join(abi.module_dir()).join(Self::module_file_name())
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn tcc_include_dir(&self) -> PathBuf {
        self.root.join("libtcc")
    }

    pub fn include_dir(&self) -> PathBuf {
        self.root.join("include")
    }

    pub fn winapi_include_dir(&self) -> PathBuf {
        self.root.join("include").join("winapi")
    }

    /// Include directories in the order a fresh context receives them.
    pub fn default_include_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.include_dir(),
            self.tcc_include_dir(),
            self.winapi_include_dir(),
        ]
    }
}

/// Directory containing the running executable.
pub fn install_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
