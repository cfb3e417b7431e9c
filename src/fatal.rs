//! Unconditional process-fatal escalation
//!
//! Initialization mistakes, unresolvable symbols, and unhandled foreign
//! faults are native-code bugs or build/runtime mismatches; none of them has
//! a degraded mode. They terminate the process with diagnostics instead of
//! becoming `Result`s. Aborting (rather than panicking) keeps the contract
//! honest even when unwinding is enabled and avoids unwinding across a
//! foreign stub frame, which would be undefined behavior.

use tracing::error;

/// Log `message` and terminate the process.
pub fn fatal(message: impl AsRef<str>) -> ! {
    let message = message.as_ref();
    error!(target: "fatal", "{message}");
    // The subscriber may not be installed yet (failures during library
    // load); make sure the diagnostic reaches stderr regardless.
    eprintln!("vmbridge fatal: {message}");
    std::process::abort();
}
