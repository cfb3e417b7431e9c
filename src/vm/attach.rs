//! Per-thread attachment to the foreign runtime
//!
//! Any native thread, including ones the runtime never created, can attach
//! itself and receive an [`Env`]. Attachment is idempotent; the thread name
//! is applied only on the attach that actually creates the context. There is
//! no degraded mode: if the entry point is unset or the runtime refuses the
//! thread, the process terminates.

use std::cell::Cell;
use std::marker::PhantomData;

use tracing::{debug, info};

use super::context::{context, VmContext};
use super::{RawEnv, VmRuntime};
use crate::fatal::fatal;

/// The calling thread's execution context within the foreign runtime.
///
/// One per attached thread. Deliberately `!Send`/`!Sync`: a context is only
/// meaningful on the thread that attached, so it can never cross threads.
/// Copying within the owning thread is free and safe.
#[derive(Clone, Copy)]
pub struct Env {
    ctx: &'static VmContext,
    raw: RawEnv,
    _not_send: PhantomData<*mut ()>,
}

impl Env {
    /// The raw context word, for handing back to the runtime.
    #[inline]
    pub fn raw(&self) -> RawEnv {
        self.raw
    }

    /// The process-wide context this thread is attached through.
    #[inline]
    pub fn context(&self) -> &'static VmContext {
        self.ctx
    }

    /// Shorthand for the runtime entry point.
    #[inline]
    pub(crate) fn vm(&self) -> &'static dyn VmRuntime {
        self.ctx.vm()
    }
}

// Per-thread attachment record. The runtime reference disambiguates contexts
// when tests run several mock runtimes in one process; production has exactly
// one.
#[derive(Clone, Copy)]
struct Attachment {
    vm: &'static dyn VmRuntime,
    raw: RawEnv,
}

thread_local! {
    static ATTACHMENT: Cell<Option<Attachment>> = const { Cell::new(None) };
}

#[inline]
fn vm_id(vm: &'static dyn VmRuntime) -> *const u8 {
    vm as *const dyn VmRuntime as *const u8
}

impl VmContext {
    /// Attach the calling thread, or return its existing context.
    pub fn attach_current_thread(&'static self) -> Env {
        self.attach_inner(None)
    }

    /// Attach the calling thread, naming it within the runtime's thread
    /// listing on first attach.
    ///
    /// A plain attach leaves the runtime to invent an anonymous default
    /// name, so native-created threads should attach through here right
    /// after creation if they want to be identifiable in runtime-side
    /// tooling. If the thread is already attached the existing name is
    /// preserved and `name` is ignored; this is intentional, not a bug -
    /// the first attach wins.
    pub fn attach_current_thread_with_name(&'static self, name: &str) -> Env {
        self.attach_inner(Some(name))
    }

    fn attach_inner(&'static self, name: Option<&str>) -> Env {
        let id = vm_id(self.vm());
        if let Some(att) = ATTACHMENT.get() {
            if vm_id(att.vm) == id {
                if name.is_some() {
                    debug!(target: "attach", "thread already attached; name unchanged");
                }
                return Env {
                    ctx: self,
                    raw: att.raw,
                    _not_send: PhantomData,
                };
            }
            // Record for another runtime (test doubles only; a process has
            // one runtime). Detach from it so its thread record dies too.
            att.vm.detach_current_thread();
            ATTACHMENT.set(None);
        }
        match self.vm().attach_current_thread(name) {
            Ok(raw) => {
                ATTACHMENT.set(Some(Attachment { vm: self.vm(), raw }));
                info!(
                    target: "attach",
                    thread = ?std::thread::current().id(),
                    name = name.unwrap_or("<default>"),
                    "attached thread to runtime"
                );
                Env {
                    ctx: self,
                    raw,
                    _not_send: PhantomData,
                }
            }
            Err(err) => fatal(format!("thread attachment failed: {err}")),
        }
    }

    /// Detach the calling thread if it is attached through this context.
    ///
    /// No-op otherwise. Safe to call during thread teardown; any [`Env`]
    /// copies held by the thread are dead after this returns.
    pub fn detach_from_vm(&self) {
        if let Some(att) = ATTACHMENT.get() {
            if vm_id(att.vm) == vm_id(self.vm()) {
                ATTACHMENT.set(None);
                self.vm().detach_current_thread();
                debug!(
                    target: "attach",
                    thread = ?std::thread::current().id(),
                    "detached thread from runtime"
                );
            }
        }
    }
}

/// Attach the calling thread to the process-wide runtime. See
/// [`VmContext::attach_current_thread`]. Fatal before `init_vm`.
pub fn attach_current_thread() -> Env {
    context().attach_current_thread()
}

/// Attach the calling thread, naming it on first attach. See
/// [`VmContext::attach_current_thread_with_name`].
pub fn attach_current_thread_with_name(name: &str) -> Env {
    context().attach_current_thread_with_name(name)
}

/// Detach the calling thread from the process-wide runtime; no-op if it was
/// never attached or the runtime was never initialized.
pub fn detach_from_vm() {
    if super::context::is_vm_initialized() {
        context().detach_from_vm();
    }
}
