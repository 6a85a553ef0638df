//! `tracing` subscriber setup.
//!
//! The engine logs through `tracing` spans and events; the host application
//! decides where they go. This helper installs a plain stderr subscriber for
//! binaries and tests that don't bring their own.

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup. Subsequent calls are no-ops, so tests may call it
/// freely. `RUST_LOG` overrides `level` when set.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails when a subscriber is already installed; keep it
    let _ = subscriber.try_init();
}
