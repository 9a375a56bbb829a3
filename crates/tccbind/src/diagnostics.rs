use std::cell::{Cell, RefCell};
use std::ffi::{c_void, CStr};
use std::fmt;
use std::ptr::NonNull;

use tccbind_native::DiagnosticRelay;

/// Host-side receiver for compiler messages.
pub type DiagnosticSink<'host> = Box<dyn FnMut(&str) + Send + 'host>;

/// Per-context destination of foreign diagnostics.
///
/// The relay inside points back at the channel itself, so the channel is heap-pinned
/// for the life of the context and its address handed to the foreign side once.
pub(crate) struct ErrorChannel<'host> {
    relay: DiagnosticRelay,
    sink: RefCell<Option<DiagnosticSink<'host>>>,
    delivered: Cell<usize>,
}

unsafe fn deliver_to_channel(target: *const c_void, message: &CStr) {
    let channel = &*target.cast::<ErrorChannel<'_>>();
    channel.deliver(message);
}

impl<'host> ErrorChannel<'host> {
    fn deliver(&self, message: &CStr) {
        let text = message.to_string_lossy();
        log::debug!(target: "tccbind::diagnostics", "{}", text);
        self.delivered.set(self.delivered.get() + 1);
        if let Some(sink) = self.sink.borrow_mut().as_mut() {
            sink(&text);
        }
    }
}

/// Owning pointer to a pinned [`ErrorChannel`].
pub(crate) struct ChannelBox<'host> {
    channel: NonNull<ErrorChannel<'host>>,
}

impl<'host> ChannelBox<'host> {
    pub(crate) fn new() -> Self {
        let raw = Box::into_raw(Box::new(ErrorChannel {
            relay: unsafe { DiagnosticRelay::new(std::ptr::null(), deliver_to_channel) },
            sink: RefCell::new(None),
            delivered: Cell::new(0),
        }));
        // SAFETY: `raw` is a fresh allocation freed only by `Drop`, so the address the
        // relay captures stays valid as long as the relay can be reached.
        unsafe {
            (*raw).relay = DiagnosticRelay::new(raw.cast::<c_void>().cast_const(), deliver_to_channel);
            Self {
                channel: NonNull::new_unchecked(raw),
            }
        }
    }

    /// The token to register with `tcc_set_error_func`.
    pub(crate) fn relay(&self) -> NonNull<DiagnosticRelay> {
        unsafe { NonNull::from(&(*self.channel.as_ptr()).relay) }
    }

    fn get(&self) -> &ErrorChannel<'host> {
        unsafe { self.channel.as_ref() }
    }

    pub(crate) fn set_sink(&mut self, sink: Option<DiagnosticSink<'host>>) {
        *self.get().sink.borrow_mut() = sink;
    }

    pub(crate) fn has_sink(&self) -> bool {
        self.get().sink.borrow().is_some()
    }

    pub(crate) fn delivered(&self) -> usize {
        self.get().delivered.get()
    }
}

impl Drop for ChannelBox<'_> {
    fn drop(&mut self) {
        unsafe { drop(Box::from_raw(self.channel.as_ptr())) }
    }
}

impl fmt::Debug for ChannelBox<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("has_sink", &self.has_sink())
            .field("delivered", &self.delivered())
            .finish()
    }
}
