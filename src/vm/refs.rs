//! Reference ownership wrappers
//!
//! The foreign object system hands out references in two lifetime modes:
//! call-scope ([`LocalRef`]) and process-lifetime ([`GlobalRef`]). Each
//! wrapper owns exactly one outstanding reference of its mode and releases
//! it exactly once on drop, whatever the exit path. Releases go through the
//! runtime's fault-tolerant delete primitives and never raise a fault, so
//! dropping is safe even while a fault is pending on the thread.

use super::attach::Env;
use super::{ObjectHandle, VmRuntime};

/// A call-scope reference, released when dropped.
///
/// Tied to the attached thread's [`Env`] and therefore never leaves the
/// thread that created it.
pub struct LocalRef<'env> {
    env: &'env Env,
    raw: ObjectHandle,
}

impl<'env> LocalRef<'env> {
    /// Take ownership of a raw local reference received from the runtime.
    ///
    /// `raw` must be a live local reference owned by `env`'s thread; the
    /// wrapper releases it on drop.
    pub fn from_raw(env: &'env Env, raw: ObjectHandle) -> Self {
        debug_assert_ne!(raw.as_word(), 0, "local ref around the null word");
        Self { env, raw }
    }

    /// The underlying reference word, ownership unchanged.
    #[inline]
    pub fn as_raw(&self) -> ObjectHandle {
        self.raw
    }

    /// Transfer ownership of the reference out of the wrapper.
    ///
    /// The caller becomes responsible for releasing it.
    pub fn into_raw(self) -> ObjectHandle {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    /// Register an additional call-scope reference to the same object.
    pub fn duplicate(&self) -> LocalRef<'env> {
        let raw = self.env.vm().new_local_ref(self.env.raw(), self.raw);
        LocalRef { env: self.env, raw }
    }

    /// Promote to a process-lifetime reference, releasing the local one.
    pub fn promote(self) -> GlobalRef {
        let vm = self.env.vm();
        let raw = vm.new_global_ref(self.env.raw(), self.raw);
        // Drop of `self` releases the now-redundant local reference.
        GlobalRef { vm, raw }
    }
}

impl Drop for LocalRef<'_> {
    fn drop(&mut self) {
        self.env.vm().delete_local_ref(self.env.raw(), self.raw);
    }
}

/// A process-lifetime reference, safe to store across calls and threads,
/// released when dropped.
///
/// `Send + Sync` falls out of the fields: a plain reference word plus a
/// handle to the (`Sync`) runtime; the underlying object is valid from any
/// thread by definition of the mode.
pub struct GlobalRef {
    vm: &'static dyn VmRuntime,
    raw: ObjectHandle,
}

impl GlobalRef {
    /// Take ownership of a raw global reference received from the runtime.
    pub fn from_raw(vm: &'static dyn VmRuntime, raw: ObjectHandle) -> Self {
        debug_assert_ne!(raw.as_word(), 0, "global ref around the null word");
        Self { vm, raw }
    }

    /// The underlying reference word, ownership unchanged.
    #[inline]
    pub fn as_raw(&self) -> ObjectHandle {
        self.raw
    }

    /// Transfer ownership of the reference out of the wrapper.
    pub fn into_raw(self) -> ObjectHandle {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }

    /// Register an additional process-lifetime reference to the same object.
    ///
    /// Needs an attached thread: creating a reference is a boundary call
    /// (releasing one is not, hence `Drop` needs no env).
    pub fn duplicate(&self, env: &Env) -> GlobalRef {
        let raw = self.vm.new_global_ref(env.raw(), self.raw);
        GlobalRef { vm: self.vm, raw }
    }
}

impl Drop for GlobalRef {
    fn drop(&mut self) {
        self.vm.delete_global_ref(self.raw);
    }
}
