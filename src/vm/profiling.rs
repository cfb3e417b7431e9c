//! Stack-frame-link markers for external frame-based unwinders
//!
//! Generated boundary stubs install a [`StackFrameSaver`] as the last thing
//! before control crosses into the managed side; the matching callback stub
//! reads [`StackFrameSaver::saved_frame`] to link its own frame to the saved
//! one, letting frame-pointer unwinders produce complete traces across the
//! boundary. Purely a profiling convenience - compiled only with the
//! `profiling` feature, zero cost otherwise.

use core::ffi::c_void;
use std::cell::Cell;

thread_local! {
    static SAVED_FRAME: Cell<*mut c_void> = const { Cell::new(std::ptr::null_mut()) };
}

/// Scoped marker holding the caller's frame pointer in a thread-local.
///
/// Nested markers stack: each restores the previous saved frame on drop.
pub struct StackFrameSaver {
    previous: *mut c_void,
}

impl StackFrameSaver {
    /// Save `current_fp` for the duration of this scope.
    pub fn new(current_fp: *mut c_void) -> Self {
        let previous = SAVED_FRAME.replace(current_fp);
        Self { previous }
    }

    /// The frame pointer saved by the innermost live marker on this thread,
    /// or null if none is installed.
    pub fn saved_frame() -> *mut c_void {
        SAVED_FRAME.get()
    }
}

impl Drop for StackFrameSaver {
    fn drop(&mut self) {
        SAVED_FRAME.set(self.previous);
    }
}
