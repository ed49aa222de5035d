//! Logging setup
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to binaries and tests. Both helpers honour `RUST_LOG` and fall back to
//! the given level when it is unset or malformed.
//!
//! Useful targets:
//!
//! | Filter                              | Shows                          |
//! |-------------------------------------|--------------------------------|
//! | `simsched=info`                     | exploration start/finish       |
//! | `simsched::domain::explorer=debug`  | one line per run               |
//! | `simsched::domain::scheduler=trace` | every step, trap and wake      |

use tracing_subscriber::EnvFilter;

fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global fmt subscriber writing to stderr
///
/// Returns `false` if a global subscriber was already set.
pub fn init(fallback: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(fallback))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// Install a subscriber that writes through the test harness capture
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("warn"))
        .with_test_writer()
        .try_init();
}
