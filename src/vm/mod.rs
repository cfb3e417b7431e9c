//! Foreign-runtime abstraction - the boundary this crate bridges
//!
//! The managed runtime on the other side of the boundary is a black box that
//! exposes exactly three capabilities: symbol lookup, reference counting, and
//! pending-fault state. [`VmRuntime`] captures that contract as a trait so the
//! rest of the bridge (and its tests) never depend on a concrete runtime.
//!
//! Architecture:
//! - `context.rs` - Process-wide registry (entry point, resolver root, mode)
//! - `attach.rs`  - Per-thread execution contexts ([`Env`])
//! - `refs.rs`    - Local/global reference ownership wrappers
//! - `cache.rs`   - Lazy memoized class/method handle resolution
//! - `fault.rs`   - Pending-fault poll/clear/escalate/format
//! - `profiling.rs` - Optional stack-frame-link markers for unwinders

mod attach;
mod cache;
mod context;
mod fault;
mod refs;

#[cfg(feature = "profiling")]
mod profiling;

pub use attach::{attach_current_thread, attach_current_thread_with_name, detach_from_vm, Env};
pub use cache::{
    get_class, get_method, has_class, ClassCache, InstanceKind, InstanceMethodCache, MethodCache,
    MethodKind, StaticKind, StaticMethodCache,
};
pub use context::{
    init_replacement_loader, init_vm, is_vm_initialized, registration_mode, set_registration_mode,
    RegistrationMode, VmContext,
};
pub use fault::{check_fault_fatal, clear_fault, format_fault, has_fault};
pub use refs::{GlobalRef, LocalRef};

#[cfg(feature = "profiling")]
pub use profiling::StackFrameSaver;


/// Opaque per-thread execution-context word handed out by the runtime.
///
/// One per attached thread; never shared across threads. The word 0 is
/// reserved and never produced by a successful attach.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct RawEnv(usize);

/// Opaque reference word for an object inside the foreign object system.
///
/// Carries no ownership; ownership lives in [`LocalRef`] / [`GlobalRef`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ObjectHandle(usize);

/// Reference word for a resolved class. Classes are objects in the foreign
/// object system, so every `ClassHandle` is also addressable as an
/// [`ObjectHandle`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ClassHandle(usize);

/// Identifier word for a resolved method. Method handles are not references
/// and are not reference counted; they stay valid for the process lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct MethodHandle(usize);

macro_rules! word_handle {
    ($ty:ident) => {
        impl $ty {
            /// Wrap a raw word received from the runtime.
            #[inline]
            pub const fn from_word(word: usize) -> Self {
                Self(word)
            }

            /// The raw word, as handed out by the runtime.
            #[inline]
            pub const fn as_word(self) -> usize {
                self.0
            }
        }
    };
}

word_handle!(RawEnv);
word_handle!(ObjectHandle);
word_handle!(ClassHandle);
word_handle!(MethodHandle);

impl ClassHandle {
    /// View the class as a plain object reference (for refcount operations).
    #[inline]
    pub const fn as_object(self) -> ObjectHandle {
        ObjectHandle(self.0)
    }
}

/// Entry in a native-method registration table.
///
/// Tables of these are emitted by the external stub generator and installed
/// by its registration routine; how many tables get installed is governed by
/// [`RegistrationMode`]. This crate only defines the shape.
#[derive(Clone, Copy)]
pub struct RegistrationMethod {
    pub name: &'static str,
    pub register: fn(&Env) -> bool,
}

/// The black-box foreign runtime behind the boundary.
///
/// Implementations wrap the real managed runtime's entry point; tests use
/// [`crate::testing::MockRuntime`]. Contract, relied on throughout the crate:
///
/// - `attach_current_thread` is idempotent for a given native thread and
///   returns a non-zero [`RawEnv`]; the optional name is applied only when
///   the call actually attaches.
/// - Successful lookups return non-zero handles. A failed lookup may leave a
///   fault pending on `env`; callers either clear it or escalate.
/// - `delete_global_ref` is callable from any thread, with or without a
///   pending fault, and never raises a fault itself. `delete_local_ref` is
///   likewise fault-tolerant but bound to the owning thread's `env`.
/// - The runtime performs its own internal locking; this crate adds
///   synchronization only for its own cached state.
pub trait VmRuntime: Send + Sync {
    /// Attach the calling native thread, or return its existing context.
    fn attach_current_thread(&self, name: Option<&str>) -> Result<RawEnv, VmError>;

    /// Detach the calling native thread. No-op if it was never attached.
    fn detach_current_thread(&self);

    /// Resolve a class by name through `loader` if given, else through the
    /// runtime's default resolution root.
    fn find_class(
        &self,
        env: RawEnv,
        name: &str,
        loader: Option<ObjectHandle>,
    ) -> Result<ClassHandle, VmError>;

    /// Resolve an instance method on `class`.
    fn instance_method(
        &self,
        env: RawEnv,
        class: ClassHandle,
        name: &str,
        signature: &str,
    ) -> Result<MethodHandle, VmError>;

    /// Resolve a static method on `class`.
    fn static_method(
        &self,
        env: RawEnv,
        class: ClassHandle,
        name: &str,
        signature: &str,
    ) -> Result<MethodHandle, VmError>;

    /// Register a new call-scope reference to `obj`.
    fn new_local_ref(&self, env: RawEnv, obj: ObjectHandle) -> ObjectHandle;

    /// Release a call-scope reference. Never raises a fault.
    fn delete_local_ref(&self, env: RawEnv, obj: ObjectHandle);

    /// Register a new process-lifetime reference to `obj`.
    fn new_global_ref(&self, env: RawEnv, obj: ObjectHandle) -> ObjectHandle;

    /// Release a process-lifetime reference, from any thread. Never raises
    /// a fault.
    fn delete_global_ref(&self, obj: ObjectHandle);

    /// Non-destructive poll of pending-fault state on `env`.
    fn fault_pending(&self, env: RawEnv) -> bool;

    /// Clear the pending fault on `env`, if any, returning the fault object
    /// as a fresh local reference owned by the caller.
    fn take_fault(&self, env: RawEnv) -> Option<ObjectHandle>;

    /// Human-readable trace of `fault`. Leaves pending state untouched.
    fn describe_fault(&self, env: RawEnv, fault: ObjectHandle) -> String;
}

/// Errors surfaced by a [`VmRuntime`] implementation.
///
/// Only the runtime trait speaks `Result`; at the bridge surface these all
/// escalate to process-fatal (attachment and symbol resolution have no
/// degraded mode).
#[derive(Debug)]
pub enum VmError {
    /// The runtime refused to attach the calling thread.
    AttachFailed(String),
    /// No class with the requested name is visible to the resolution root.
    ClassNotFound(String),
    /// The class exists but has no method with the requested name/signature.
    MethodNotFound {
        class: String,
        name: String,
        signature: String,
    },
}

impl core::fmt::Display for VmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AttachFailed(msg) => write!(f, "thread attachment refused: {}", msg),
            Self::ClassNotFound(name) => write!(f, "class not found: {}", name),
            Self::MethodNotFound {
                class,
                name,
                signature,
            } => write!(f, "method not found: {}.{}{}", class, name, signature),
        }
    }
}

impl std::error::Error for VmError {}
