use std::ffi::c_int;
use std::fmt;

/// How a finalized context was finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finalized {
    /// At least one symbol was looked up after relocation.
    Resolved,
    /// The program entry point was executed.
    Ran,
    /// The compiled unit was written to a file.
    Emitted,
}

/// Lifecycle position of a compilation context.
///
/// ```text
/// Created -> Configured -> Compiled -> Relocated -> Finalized(Resolved | Ran)
///                              \-> Finalized(Emitted)
/// any live stage -> Disposed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Created,
    Configured,
    Compiled,
    Relocated,
    Finalized(Finalized),
    Disposed,
}

impl Stage {
    /// Options, paths, macros and further source units are still accepted.
    pub fn is_open(self) -> bool {
        matches!(self, Stage::Created | Stage::Configured | Stage::Compiled)
    }

    /// Code lives in process memory and symbols can be looked up.
    pub fn is_relocated(self) -> bool {
        matches!(
            self,
            Stage::Relocated | Stage::Finalized(Finalized::Resolved) | Stage::Finalized(Finalized::Ran)
        )
    }

    /// No more symbols may be injected.
    pub fn is_sealed(self) -> bool {
        matches!(self, Stage::Relocated | Stage::Finalized(_))
    }

    pub fn is_disposed(self) -> bool {
        self == Stage::Disposed
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Created => write!(f, "created"),
            Stage::Configured => write!(f, "configured"),
            Stage::Compiled => write!(f, "compiled"),
            Stage::Relocated => write!(f, "relocated"),
            Stage::Finalized(Finalized::Resolved) => write!(f, "finalized (symbols resolved)"),
            Stage::Finalized(Finalized::Ran) => write!(f, "finalized (program ran)"),
            Stage::Finalized(Finalized::Emitted) => write!(f, "finalized (file emitted)"),
            Stage::Disposed => write!(f, "disposed"),
        }
    }
}

/// What the foreign compiler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputType {
    /// Code relocated into the current process.
    #[default]
    Memory,
    Executable,
    DynamicLibrary,
    Object,
    /// Preprocessed source only.
    Preprocess,
}

impl OutputType {
    /// The `TCC_OUTPUT_*` code.
    pub fn code(self) -> c_int {
        match self {
            OutputType::Memory => 1,
            OutputType::Executable => 2,
            OutputType::DynamicLibrary => 3,
            OutputType::Object => 4,
            OutputType::Preprocess => 5,
        }
    }

    pub fn from_code(code: c_int) -> Option<Self> {
        match code {
            1 => Some(OutputType::Memory),
            2 => Some(OutputType::Executable),
            3 => Some(OutputType::DynamicLibrary),
            4 => Some(OutputType::Object),
            5 => Some(OutputType::Preprocess),
            _ => None,
        }
    }

    /// Whether the result is written with `output_file` rather than relocated.
    pub fn is_file(self) -> bool {
        self != OutputType::Memory
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputType::Memory => "memory",
            OutputType::Executable => "executable",
            OutputType::DynamicLibrary => "dynamic library",
            OutputType::Object => "object file",
            OutputType::Preprocess => "preprocessed source",
        };
        f.write_str(name)
    }
}
