//! Shared Testing Utilities
//!
//! Common test infrastructure for the forum workspace:
//!
//! - [`MockRelay`], an in-process NIP-01 relay with switches for failure modes
//! - Fixtures for deterministic identities and signed events

pub mod fixtures;
pub mod mock_relay;

pub use fixtures::*;
pub use mock_relay::*;

use std::sync::Once;

/// Install a tracing subscriber once per test binary. `RUST_LOG` overrides
/// the default `warn` level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
