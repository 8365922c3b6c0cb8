//! Log subscriber setup for the ackwire binaries.
//!
//! `RUST_LOG` takes precedence, e.g. `RUST_LOG=ackwire=debug` shows every
//! inbound payload and outbound frame.

use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "ackwire=info,ackwire_transport=info";

/// Installs a `fmt` subscriber writing to stderr.
///
/// Call once at startup. Later calls (and calls after another subscriber
/// was installed) are ignored.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
