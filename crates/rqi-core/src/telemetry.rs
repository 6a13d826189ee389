//! Log output for the `rqi` gate.
//!
//! Pillar skips, analysis polling progress and the final gate decision are
//! emitted as tracing events on stderr. Stdout carries only the quality
//! dashboard, so CI can capture the verdict text without log noise.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// `level` follows the CLI's `--verbose` flag and `RUST_LOG` takes
/// precedence over it. `--json-logs` sets `json`, giving one JSON object per
/// event for log collectors. Only the first call in a process has any effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}
