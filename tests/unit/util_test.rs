//! Tests for utility functions

use tier_admission::util::{init_tracing, init_tracing_with};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    // A subscriber is now installed, so a second install is refused.
    assert!(!init_tracing_with("debug"));
}
