//! Lazy memoized symbol resolution
//!
//! Class and method handles are resolved across the boundary at most
//! logically once and memoized in word-sized atomic slots. The fast path is
//! a single acquire load: no lock, no allocation, no boundary crossing.
//! First touch resolves through the current resolution root and publishes
//! with a compare-and-swap; concurrent first-resolvers are allowed to race
//! because resolution is idempotent, and the losers release their redundant
//! reference. A published handle is never mutated or invalidated for the
//! remaining process lifetime.
//!
//! Failure to resolve is a build/runtime version mismatch and is fatal;
//! [`has_class`] is the sanctioned probe for optionally-present classes.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use super::attach::Env;
use super::refs::LocalRef;
use super::{ClassHandle, MethodHandle, VmError};
use crate::fatal::fatal;

// Sentinel for an unpublished slot. The runtime never hands out the word 0.
const EMPTY: usize = 0;

/// Resolve `name` through the current resolution root, uncached.
///
/// Returns a call-scope reference; prefer a static [`ClassCache`] for
/// anything resolved more than once. Fatal if the class is missing: at this
/// layer a failed class lookup means the native binary and the managed side
/// disagree about what exists, which is not a run-time condition.
pub fn get_class<'env>(env: &'env Env, name: &str) -> LocalRef<'env> {
    let root = env.context().resolution_root();
    match env.vm().find_class(env.raw(), name, root) {
        Ok(class) => LocalRef::from_raw(env, class.as_object()),
        Err(err) => {
            let detail = pending_fault_text(env);
            fatal(format!("class resolution failed: {err}{detail}"));
        }
    }
}

/// Probe whether `name` is visible to the current resolution root.
///
/// Clears the not-found fault the probe provokes; this deliberate clear is
/// the one sanctioned way to ask about optionally-present classes.
pub fn has_class(env: &Env, name: &str) -> bool {
    let root = env.context().resolution_root();
    match env.vm().find_class(env.raw(), name, root) {
        Ok(class) => {
            drop(LocalRef::from_raw(env, class.as_object()));
            true
        }
        Err(_) => {
            if let Some(fault) = env.vm().take_fault(env.raw()) {
                trace!(target: "symbols", class = name, "cleared probe fault");
                env.vm().delete_local_ref(env.raw(), fault);
            }
            false
        }
    }
}

/// A memoizing cell for one class, usable as a `static`.
///
/// ```no_run
/// use vmbridge::{attach_current_thread, ClassCache};
///
/// static CODEC_CLASS: ClassCache = ClassCache::new("app/TextCodec");
///
/// let env = attach_current_thread();
/// let class = CODEC_CLASS.get(&env);
/// # let _ = class;
/// ```
pub struct ClassCache {
    name: &'static str,
    slot: AtomicUsize,
}

impl ClassCache {
    /// A new, unresolved cache for `name`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: AtomicUsize::new(EMPTY),
        }
    }

    /// The class name this cache resolves.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The memoized handle, resolving on first touch.
    ///
    /// Concurrent first callers may both resolve; exactly one result gets
    /// published and the other is released, so the slot ends up owning
    /// exactly one process-lifetime reference. Fatal if the class cannot be
    /// resolved.
    pub fn get(&self, env: &Env) -> ClassHandle {
        let cached = self.slot.load(Ordering::Acquire);
        if cached != EMPTY {
            return ClassHandle::from_word(cached);
        }
        self.resolve_slow(env)
    }

    #[cold]
    fn resolve_slow(&self, env: &Env) -> ClassHandle {
        let global = get_class(env, self.name).promote();
        let word = global.as_raw().as_word();
        match self
            .slot
            .compare_exchange(EMPTY, word, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                trace!(target: "symbols", class = self.name, "class handle published");
                // The slot now owns the reference for the process lifetime.
                let _ = global.into_raw();
                ClassHandle::from_word(word)
            }
            Err(published) => {
                // Lost the publish race; the two handles denote the same
                // class. Dropping releases our redundant reference.
                drop(global);
                ClassHandle::from_word(published)
            }
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Compile-time choice of method-lookup primitive. Implemented only by
/// [`StaticKind`] and [`InstanceKind`]; no run-time discriminator exists.
pub trait MethodKind: sealed::Sealed {
    #[doc(hidden)]
    fn resolve(
        env: &Env,
        class: ClassHandle,
        name: &str,
        signature: &str,
    ) -> Result<MethodHandle, VmError>;
}

/// Tag selecting static-method lookup.
pub enum StaticKind {}

/// Tag selecting instance-method lookup.
pub enum InstanceKind {}

impl sealed::Sealed for StaticKind {}
impl sealed::Sealed for InstanceKind {}

impl MethodKind for StaticKind {
    fn resolve(
        env: &Env,
        class: ClassHandle,
        name: &str,
        signature: &str,
    ) -> Result<MethodHandle, VmError> {
        env.vm().static_method(env.raw(), class, name, signature)
    }
}

impl MethodKind for InstanceKind {
    fn resolve(
        env: &Env,
        class: ClassHandle,
        name: &str,
        signature: &str,
    ) -> Result<MethodHandle, VmError> {
        env.vm().instance_method(env.raw(), class, name, signature)
    }
}

/// Resolve a method on `class`, uncached.
///
/// One boundary crossing per call; prefer a static [`MethodCache`] for
/// anything resolved more than once. Fatal if the method is missing, for
/// the same reason as [`get_class`].
pub fn get_method<K: MethodKind>(
    env: &Env,
    class: ClassHandle,
    name: &str,
    signature: &str,
) -> MethodHandle {
    match K::resolve(env, class, name, signature) {
        Ok(method) => method,
        Err(err) => {
            let detail = pending_fault_text(env);
            fatal(format!("method resolution failed: {err}{detail}"));
        }
    }
}

/// A memoizing cell for one method, usable as a `static`.
///
/// The class comes from a [`ClassCache`], so a cold method lookup resolves
/// the class on the way. Method handles are identifiers, not references:
/// the CAS loser has nothing to release and simply adopts the winner.
pub struct MethodCache<K: MethodKind> {
    class: &'static ClassCache,
    name: &'static str,
    signature: &'static str,
    slot: AtomicUsize,
    _kind: PhantomData<K>,
}

/// Cache for a static method.
pub type StaticMethodCache = MethodCache<StaticKind>;

/// Cache for an instance method.
pub type InstanceMethodCache = MethodCache<InstanceKind>;

impl<K: MethodKind> MethodCache<K> {
    /// A new, unresolved cache for `name` with descriptor `signature`.
    pub const fn new(
        class: &'static ClassCache,
        name: &'static str,
        signature: &'static str,
    ) -> Self {
        Self {
            class,
            name,
            signature,
            slot: AtomicUsize::new(EMPTY),
            _kind: PhantomData,
        }
    }

    /// The memoized handle, resolving (class first, then method) on first
    /// touch. Fatal if the method cannot be resolved.
    pub fn get(&self, env: &Env) -> MethodHandle {
        let cached = self.slot.load(Ordering::Acquire);
        if cached != EMPTY {
            return MethodHandle::from_word(cached);
        }
        self.resolve_slow(env)
    }

    #[cold]
    fn resolve_slow(&self, env: &Env) -> MethodHandle {
        let class = self.class.get(env);
        let resolved = match K::resolve(env, class, self.name, self.signature) {
            Ok(method) => method,
            Err(err) => {
                let detail = pending_fault_text(env);
                fatal(format!("method resolution failed: {err}{detail}"));
            }
        };
        match self.slot.compare_exchange(
            EMPTY,
            resolved.as_word(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                trace!(
                    target: "symbols",
                    class = self.class.name,
                    method = self.name,
                    "method handle published"
                );
                resolved
            }
            Err(published) => MethodHandle::from_word(published),
        }
    }
}

// Diagnostic text for the fatal path: consume and describe the pending
// fault, if the runtime raised one alongside the error.
fn pending_fault_text(env: &Env) -> String {
    match env.vm().take_fault(env.raw()) {
        Some(fault) => {
            let text = env.vm().describe_fault(env.raw(), fault);
            env.vm().delete_local_ref(env.raw(), fault);
            format!("; pending fault: {text}")
        }
        None => String::new(),
    }
}
