use std::ffi::{c_char, c_int, CString};
use std::path::Path;
use std::ptr;

use crate::error::{BindError, BindResult};

pub(crate) fn c_string(what: &str, value: &str) -> BindResult<CString> {
    CString::new(value).map_err(|_| BindError::InvalidArgument {
        what: what.to_owned(),
        reason: "it contains an interior NUL byte",
    })
}

/// libtcc takes narrow, NUL-terminated paths.
pub(crate) fn c_path(path: &Path) -> BindResult<CString> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = match path.to_str() {
        Some(text) => text.as_bytes().to_vec(),
        None => {
            return Err(BindError::InvalidArgument {
                what: format!("path {}", path.display()),
                reason: "it is not valid UTF-8",
            })
        }
    };
    CString::new(bytes).map_err(|_| BindError::InvalidArgument {
        what: format!("path {}", path.display()),
        reason: "it contains an interior NUL byte",
    })
}

/// A NULL-terminated `argv` whose strings live as long as the vector.
pub(crate) struct Argv {
    _strings: Vec<CString>,
    pointers: Vec<*mut c_char>,
}

impl Argv {
    pub(crate) fn new<S: AsRef<str>>(args: &[S]) -> BindResult<Self> {
        let strings = args
            .iter()
            .enumerate()
            .map(|(i, arg)| c_string(&format!("argument {i}"), arg.as_ref()))
            .collect::<BindResult<Vec<_>>>()?;
        if c_int::try_from(strings.len()).is_err() {
            return Err(BindError::InvalidArgument {
                what: format!("{} program arguments", strings.len()),
                reason: "argc does not fit in a C int",
            });
        }
        let mut pointers: Vec<*mut c_char> = strings.iter().map(|s| s.as_ptr().cast_mut()).collect();
        pointers.push(ptr::null_mut());
        Ok(Self {
            _strings: strings,
            pointers,
        })
    }

    pub(crate) fn argc(&self) -> c_int {
        // Checked against c_int::MAX in `new`.
        (self.pointers.len() - 1) as c_int
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut *mut c_char {
        self.pointers.as_mut_ptr()
    }
}
