//! Diagnostics for the `korgym` binary.
//!
//! Tracing goes to stderr so stdout stays clean for JSON results.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`; `--verbose` raises the harness
/// crates to `debug`.
///
/// ```bash
/// RUST_LOG=korgym_core=trace korgym play 3-2048 --seed 1
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,korgym_core=debug,korgym_judge=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
