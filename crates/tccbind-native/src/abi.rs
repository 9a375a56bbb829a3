use std::fmt;

use crate::error::NativeError;

#[cfg(not(any(target_pointer_width = "32", target_pointer_width = "64")))]
compile_error!("tccbind only supports hosts with 32-bit or 64-bit pointers");

/// Calling convention used by an entry table and by every callback handed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// `extern "C"` (cdecl on 32-bit x86).
    Cdecl,
    /// `extern "system"` (stdcall on 32-bit Windows, the platform C convention elsewhere).
    System,
}

impl CallingConvention {
    /// Whether code compiled for `self` can be called through `other`.
    ///
    /// The two conventions only differ on 32-bit Windows; everywhere else `"system"`
    /// lowers to the C convention.
    pub fn is_interchangeable_with(self, other: CallingConvention) -> bool {
        self == other || !cfg!(all(windows, target_arch = "x86"))
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallingConvention::Cdecl => write!(f, "extern \"C\""),
            CallingConvention::System => write!(f, "extern \"system\""),
        }
    }
}

/// The binary interface a compilation context talks to the foreign compiler with.
///
/// The narrow variant pairs 32-bit pointers with `extern "C"`, the wide variant pairs
/// 64-bit pointers with `extern "system"`. A context fixes its variant at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiVariant {
    Narrow,
    Wide,
}

impl AbiVariant {
    /// Maps a pointer width in bits to its ABI variant.
    pub fn select(pointer_width: u32) -> Result<Self, NativeError> {
        match pointer_width {
            32 => Ok(AbiVariant::Narrow),
            64 => Ok(AbiVariant::Wide),
            other => Err(NativeError::UnsupportedPointerWidth(other)),
        }
    }

    /// The variant matching the running process.
    pub fn host() -> Result<Self, NativeError> {
        Self::select(usize::BITS)
    }

    pub fn pointer_width(self) -> u32 {
        match self {
            AbiVariant::Narrow => 32,
            AbiVariant::Wide => 64,
        }
    }

    pub fn calling_convention(self) -> CallingConvention {
        match self {
            AbiVariant::Narrow => CallingConvention::Cdecl,
            AbiVariant::Wide => CallingConvention::System,
        }
    }

    /// Directory under the native root holding this variant's compiler module.
    pub fn module_dir(self) -> &'static str {
        match self {
            AbiVariant::Narrow => "x86",
            AbiVariant::Wide => "x64",
        }
    }

    /// Whether this variant can be driven from the current process.
    pub fn is_host(self) -> bool {
        self.pointer_width() == usize::BITS
    }
}

impl fmt::Display for AbiVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit/{}", self.pointer_width(), self.calling_convention())
    }
}
