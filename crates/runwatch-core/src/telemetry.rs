//! Diagnostic logging for the runwatch binary.
//!
//! Diagnostics go to stderr through `tracing`; stdout carries only the
//! progress output written through [`Console`](crate::console::Console).
//! `RUST_LOG` overrides the verbosity chosen on the command line.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: `level` for runwatch's own crates, warnings elsewhere.
fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::new(format!("warn,runwatch={level},runwatch_core={level}"))
}

/// Install the global subscriber, as plain text or newline-delimited JSON.
///
/// Returns `false` when a subscriber was already installed; the existing one
/// stays in place.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let text = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let structured = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(structured)
        .try_init()
        .is_ok()
}
