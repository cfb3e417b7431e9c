//! Logging for the interop bridge
//!
//! Structured logging via `tracing`, with one target per subsystem so hosts
//! can filter: `attach` (thread lifecycle), `symbols` (resolution and cache
//! publishes), `fault` (cleared or escalated faults), `fatal`.

pub use tracing::{debug, error, info, trace, warn, Level};

/// Initialize bridge logging with sensible defaults.
///
/// Call early in the host's library-load entry point, alongside `init_vm`.
/// Honors `RUST_LOG`; otherwise logs at INFO (DEBUG in debug builds).
/// Idempotent: a subscriber installed by the host wins.
pub fn init() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            EnvFilter::new("vmbridge=debug")
        }
        #[cfg(not(debug_assertions))]
        {
            EnvFilter::new("vmbridge=info")
        }
    });

    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok(); // Ignore error if already initialized
}
