//! Fault bridge between the two error models
//!
//! The foreign runtime reports failures as pending fault state on the
//! thread's execution context; native code reports them as return values or
//! fatal assertions. The two cannot be merged, so every boundary crossing is
//! followed by an explicit poll. Nothing is swallowed silently: callers
//! either clear a fault deliberately (which logs its trace) or let
//! [`check_fault_fatal`] terminate the process.

use tracing::warn;

use super::attach::Env;
use super::ObjectHandle;
use crate::fatal::fatal;

/// Whether a fault is pending on this thread. Non-destructive.
pub fn has_fault(env: &Env) -> bool {
    env.vm().fault_pending(env.raw())
}

/// Clear the pending fault, if any, returning whether one was pending.
///
/// The fault's trace is logged at `warn` before it is discarded, so a
/// deliberate clear still leaves a diagnostic record.
pub fn clear_fault(env: &Env) -> bool {
    match env.vm().take_fault(env.raw()) {
        Some(fault) => {
            let trace = env.vm().describe_fault(env.raw(), fault);
            warn!(target: "fault", %trace, "cleared pending fault");
            env.vm().delete_local_ref(env.raw(), fault);
            true
        }
        None => false,
    }
}

/// Escalate an unexpected pending fault to process-fatal.
///
/// No-op when no fault is pending. A fault still pending after a boundary
/// call that was not expected to raise one is a programming error, not a
/// recoverable condition.
pub fn check_fault_fatal(env: &Env) {
    if let Some(fault) = env.vm().take_fault(env.raw()) {
        let trace = env.vm().describe_fault(env.raw(), fault);
        fatal(format!("unhandled fault from foreign runtime: {trace}"));
    }
}

/// Human-readable trace of `fault`, for diagnostic logging.
///
/// Does not clear any pending state; `fault` stays owned by the caller.
pub fn format_fault(env: &Env, fault: ObjectHandle) -> String {
    env.vm().describe_fault(env.raw(), fault)
}
