//! Process-wide runtime registry
//!
//! Holds the single entry point to the foreign runtime, the optional
//! replacement symbol-resolution root, and the registration-mode flag.
//! Everything here is init-once/read-many: written during the host's
//! library-load entry point, read concurrently without locks afterwards.
//!
//! All logic lives on [`VmContext`] so tests can build an isolated context
//! over a [`crate::testing::MockRuntime`]; the free functions operate on the
//! one process-wide context.

use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::OnceCell;
use tracing::info;

use super::refs::{GlobalRef, LocalRef};
use super::{ObjectHandle, VmRuntime};
use crate::fatal::fatal;

/// How many native-method tables the external registration routine installs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum RegistrationMode {
    /// Register every native-method table.
    All = 0,
    /// Register only the tables the stub generator selected.
    Selective = 1,
    /// Register nothing.
    None = 2,
}

// Process-wide registration mode. Kept outside VmContext because the host
// sets it in its library-load entry point, possibly before init_vm runs.
// Startup-time-only by contract: best-effort atomicity, no further locking.
static REGISTRATION_MODE: AtomicU8 = AtomicU8::new(RegistrationMode::All as u8);

/// The process-wide runtime context: entry point plus resolver state.
pub struct VmContext {
    vm: &'static dyn VmRuntime,
    loader: OnceCell<GlobalRef>,
}

impl VmContext {
    /// Build a context around a runtime entry point.
    pub fn new(vm: &'static dyn VmRuntime) -> Self {
        Self {
            vm,
            loader: OnceCell::new(),
        }
    }

    /// The runtime entry point this context wraps.
    #[inline]
    pub fn vm(&self) -> &'static dyn VmRuntime {
        self.vm
    }

    /// Install the replacement symbol-resolution root.
    ///
    /// Needed because the default root used when no managed frame is on the
    /// call stack cannot see application-defined classes. `loader` is
    /// promoted to a process-lifetime reference and held forever (the local
    /// reference carries the attached thread's context). Installing twice is
    /// a native-code bug and is fatal.
    pub fn install_replacement_loader(&self, loader: LocalRef<'_>) {
        let loader = loader.promote();
        if self.loader.set(loader).is_err() {
            fatal("replacement resolution root installed twice");
        }
        info!(target: "symbols", "replacement resolution root installed");
    }

    /// The current symbol-resolution root, if a replacement was installed.
    #[inline]
    pub fn resolution_root(&self) -> Option<ObjectHandle> {
        self.loader.get().map(GlobalRef::as_raw)
    }
}

// The one process-wide context. Set exactly once; read-only thereafter.
static CONTEXT: OnceCell<VmContext> = OnceCell::new();

/// Store the process-wide runtime entry point.
///
/// Called from the host's library-load entry point, before anything else in
/// this crate. Calling again with the same entry point is a no-op; calling
/// with a different one is fatal.
pub fn init_vm(vm: &'static dyn VmRuntime) {
    let ctx = CONTEXT.get_or_init(|| {
        info!(target: "attach", "runtime entry point initialized");
        VmContext::new(vm)
    });
    // Compare by data pointer: one runtime instance per process.
    if !std::ptr::eq(
        ctx.vm as *const dyn VmRuntime as *const u8,
        vm as *const dyn VmRuntime as *const u8,
    ) {
        fatal("init_vm called twice with different runtime entry points");
    }
}

/// Whether [`init_vm`] has run.
pub fn is_vm_initialized() -> bool {
    CONTEXT.get().is_some()
}

/// The process-wide context. Fatal before [`init_vm`]: every operation in
/// this crate is undefined until the entry point is set.
pub(crate) fn context() -> &'static VmContext {
    match CONTEXT.get() {
        Some(ctx) => ctx,
        None => fatal("runtime entry point not initialized (init_vm has not run)"),
    }
}

/// Install the replacement symbol-resolution root on the process-wide
/// context. See [`VmContext::install_replacement_loader`].
pub fn init_replacement_loader(loader: LocalRef<'_>) {
    context().install_replacement_loader(loader);
}

/// The process-wide registration mode (defaults to [`RegistrationMode::All`]).
pub fn registration_mode() -> RegistrationMode {
    match REGISTRATION_MODE.load(Ordering::Relaxed) {
        0 => RegistrationMode::All,
        1 => RegistrationMode::Selective,
        _ => RegistrationMode::None,
    }
}

/// Set the process-wide registration mode.
///
/// Startup-time-only: call from the library-load entry point, before the
/// external registration routine runs. Not synchronized beyond best-effort.
pub fn set_registration_mode(mode: RegistrationMode) {
    REGISTRATION_MODE.store(mode as u8, Ordering::Relaxed);
}
