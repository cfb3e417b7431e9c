//! End-to-end tests against the process-wide bridge surface
//!
//! These go through the free functions (global context) rather than an
//! injected `VmContext`, so they cover the init-once lifecycle the host's
//! library-load entry point drives. Fatal paths are exercised as death
//! tests: the test re-executes itself with `VMBRIDGE_DEATH_CASE` set, runs
//! the offending operation in the child, and asserts the child died rather
//! than returned.

use std::process::Command;

use once_cell::sync::Lazy;
use vmbridge::testing::MockRuntime;
use vmbridge::{ClassCache, InstanceMethodCache, RegistrationMode};

static VM: Lazy<MockRuntime> = Lazy::new(|| {
    let vm = MockRuntime::new();
    vm.define_class("app/Bridge");
    vm.define_class("app/Codec");
    vm.define_method("app/Codec", "encode", "([B)[B", false);
    vm
});

fn init() {
    vmbridge::logging::init();
    vmbridge::init_vm(&*VM);
}

fn death_case() -> Option<String> {
    std::env::var("VMBRIDGE_DEATH_CASE").ok()
}

// Re-run this test binary with only `test_name` selected and the death case
// armed; report whether the child failed to survive (as it must).
fn child_died(test_name: &str, case: &str) -> bool {
    let exe = std::env::current_exe().expect("test binary path");
    let status = Command::new(exe)
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env("VMBRIDGE_DEATH_CASE", case)
        .status()
        .expect("spawn death-test child");
    !status.success()
}

#[test]
fn test_process_lifecycle_and_cached_resolution() {
    init();
    assert!(vmbridge::is_vm_initialized());
    // Same entry point again is a documented no-op.
    vmbridge::init_vm(&*VM);

    let env = vmbridge::attach_current_thread();
    let env_again = vmbridge::attach_current_thread();
    assert_eq!(env.raw(), env_again.raw());

    static BRIDGE: ClassCache = ClassCache::new("app/Bridge");
    static CODEC: ClassCache = ClassCache::new("app/Codec");
    static ENCODE: InstanceMethodCache = InstanceMethodCache::new(&CODEC, "encode", "([B)[B");

    let bridge = BRIDGE.get(&env);
    assert_eq!(BRIDGE.get(&env), bridge);
    let encode = ENCODE.get(&env);
    assert_eq!(ENCODE.get(&env), encode);

    assert!(vmbridge::has_class(&env, "app/Codec"));
    assert!(!vmbridge::has_class(&env, "app/Missing"));
    assert!(!vmbridge::has_fault(&env));
    vmbridge::check_fault_fatal(&env);
}

#[test]
fn test_named_attach_from_native_thread() {
    init();
    std::thread::spawn(|| {
        let env = vmbridge::attach_current_thread_with_name("io-worker");
        assert_eq!(VM.current_thread_name().as_deref(), Some("io-worker"));

        // Re-attach under another name: context is the same, name survives.
        let env2 = vmbridge::attach_current_thread_with_name("renamed");
        assert_eq!(env.raw(), env2.raw());
        assert_eq!(VM.current_thread_name().as_deref(), Some("io-worker"));

        vmbridge::detach_from_vm();
        assert!(!VM.current_thread_attached());
    })
    .join()
    .unwrap();
}

#[test]
fn test_detach_is_safe_without_attach_or_init() {
    // Called during thread teardown on threads that may never have touched
    // the runtime; must be a no-op, initialized or not.
    std::thread::spawn(vmbridge::detach_from_vm).join().unwrap();
}

#[test]
fn test_fault_clear_then_poll_is_clean() {
    init();
    let env = vmbridge::attach_current_thread();
    VM.raise_fault(env.raw(), "app.Timeout: backend unreachable");

    assert!(vmbridge::has_fault(&env));
    assert!(vmbridge::clear_fault(&env));
    assert!(!vmbridge::has_fault(&env));
    assert!(!vmbridge::clear_fault(&env));
}

#[test]
fn test_registration_mode_defaults_to_all() {
    // The external registration routine reads this during startup.
    assert_eq!(vmbridge::registration_mode(), RegistrationMode::All);
}

#[test]
fn test_attach_before_init_aborts() {
    if let Some(case) = death_case() {
        if case == "uninit-attach" {
            let _ = vmbridge::attach_current_thread();
            std::process::exit(0); // Unreachable if the contract holds.
        }
        return;
    }
    assert!(child_died("test_attach_before_init_aborts", "uninit-attach"));
}

#[test]
fn test_unresolvable_class_aborts() {
    if let Some(case) = death_case() {
        if case == "missing-class" {
            init();
            let env = vmbridge::attach_current_thread();
            let _ = vmbridge::get_class(&env, "app/DoesNotExist");
            std::process::exit(0);
        }
        return;
    }
    assert!(child_died("test_unresolvable_class_aborts", "missing-class"));
}

#[test]
fn test_unhandled_fault_escalates_fatally() {
    if let Some(case) = death_case() {
        if case == "unhandled-fault" {
            init();
            let env = vmbridge::attach_current_thread();
            VM.raise_fault(env.raw(), "app.BadState: left pending on purpose");
            vmbridge::check_fault_fatal(&env);
            std::process::exit(0);
        }
        return;
    }
    assert!(child_died(
        "test_unhandled_fault_escalates_fatally",
        "unhandled-fault"
    ));
}

#[test]
fn test_conflicting_init_aborts() {
    if let Some(case) = death_case() {
        if case == "conflicting-init" {
            init();
            let other: &'static MockRuntime = Box::leak(Box::new(MockRuntime::new()));
            vmbridge::init_vm(other);
            std::process::exit(0);
        }
        return;
    }
    assert!(child_died("test_conflicting_init_aborts", "conflicting-init"));
}

#[test]
fn test_second_replacement_loader_aborts() {
    if let Some(case) = death_case() {
        if case == "loader-twice" {
            init();
            let env = vmbridge::attach_current_thread();
            vmbridge::init_replacement_loader(vmbridge::get_class(&env, "app/Bridge"));
            // The root is write-once; swapping it is a native-code bug.
            vmbridge::init_replacement_loader(vmbridge::get_class(&env, "app/Bridge"));
            std::process::exit(0);
        }
        return;
    }
    assert!(child_died(
        "test_second_replacement_loader_aborts",
        "loader-twice"
    ));
}

#[test]
fn test_refused_attachment_aborts() {
    if let Some(case) = death_case() {
        if case == "refused-attach" {
            init();
            VM.refuse_next_attach();
            std::thread::spawn(|| {
                let _ = vmbridge::attach_current_thread();
            })
            .join()
            .ok();
            std::process::exit(0);
        }
        return;
    }
    assert!(child_died("test_refused_attachment_aborts", "refused-attach"));
}
