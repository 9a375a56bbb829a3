use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};

/// The opaque token registered with `tcc_set_error_func`.
///
/// The foreign compiler only keeps the raw address, so a relay must sit at a fixed
/// address for as long as the handle it was registered with is alive.
pub struct DiagnosticRelay {
    target: *const c_void,
    deliver: unsafe fn(*const c_void, &CStr),
}

impl DiagnosticRelay {
    /// Creates a relay forwarding every message to `deliver(target, message)`.
    ///
    /// # Safety
    ///
    /// `target` must be valid for `deliver` for the whole time the relay can be reached
    /// from a foreign handle.
    pub unsafe fn new(target: *const c_void, deliver: unsafe fn(*const c_void, &CStr)) -> Self {
        Self { target, deliver }
    }

    /// Forwards one message to the host side.
    ///
    /// A panic in the host handler is caught here; unwinding into the foreign compiler
    /// would abort the process.
    pub fn dispatch(&self, message: &CStr) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
            (self.deliver)(self.target, message)
        }));
        if outcome.is_err() {
            log::error!(
                "Diagnostic sink panicked; dropped message: {}",
                message.to_string_lossy()
            );
        }
    }
}

/// Entry used by the generated callback trampolines.
///
/// # Safety
///
/// `opaque` must be null or point to a live [`DiagnosticRelay`]; `message` must be null
/// or a NUL-terminated string valid for the duration of the call.
pub unsafe fn relay_from_foreign(opaque: *mut c_void, message: *const c_char) {
    if opaque.is_null() || message.is_null() {
        return;
    }
    let relay = &*(opaque as *const DiagnosticRelay);
    relay.dispatch(CStr::from_ptr(message));
}
