//! Structured logging setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "tier_admission=info";

/// Install an env-filtered fmt subscriber unless one is already set.
pub fn init_tracing() {
    let _ = init_tracing_with(DEFAULT_FILTER);
}

/// Like [`init_tracing`] with a caller-chosen fallback filter. Returns whether
/// this call installed the subscriber.
pub fn init_tracing_with(default_filter: &str) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
