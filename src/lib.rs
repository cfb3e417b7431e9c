//! vmbridge - native ↔ managed-runtime interop bridge
//!
//! This crate is the bridge layer letting native code call into, and be
//! called back from, a managed-runtime object system across an FFI
//! boundary. The forwarding calls themselves are thin; the substance is in
//! three cooperating protocols:
//!
//! - **Lazy symbol caching** ([`ClassCache`], [`MethodCache`]): class and
//!   method handles are resolved across the boundary at most logically once
//!   and memoized in atomic slots with double-checked publication, so the
//!   hot path is a single acquire load.
//! - **Thread attachment** ([`attach_current_thread`]): any native thread
//!   can idempotently attach itself to the runtime and receive a per-thread
//!   execution context ([`Env`]).
//! - **Fault bridging** ([`has_fault`], [`clear_fault`],
//!   [`check_fault_fatal`]): the runtime's exception model and the native
//!   error model never merge; pending faults are polled explicitly after
//!   every boundary call, and nothing is swallowed silently.
//!
//! The managed runtime itself is a black box behind the [`VmRuntime`]
//! trait, supplied once per process via [`init_vm`] from the host's
//! library-load entry point. [`testing::MockRuntime`] stands in for it in
//! tests.

pub mod fatal;
pub mod logging;
pub mod testing;
pub mod vm;

// Re-export the bridge surface at the crate root.
pub use vm::{
    attach_current_thread, attach_current_thread_with_name, check_fault_fatal, clear_fault,
    detach_from_vm, format_fault, get_class, get_method, has_class, has_fault,
    init_replacement_loader,
    init_vm, is_vm_initialized, registration_mode, set_registration_mode, ClassCache, ClassHandle,
    Env, GlobalRef, InstanceKind, InstanceMethodCache, LocalRef, MethodCache, MethodHandle,
    MethodKind, ObjectHandle, RawEnv, RegistrationMethod, RegistrationMode, StaticKind,
    StaticMethodCache, VmContext, VmError, VmRuntime,
};

#[cfg(feature = "profiling")]
pub use vm::StackFrameSaver;
