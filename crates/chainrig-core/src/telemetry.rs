//! Tracing initialisation for chainrig binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "CHAINRIG_LOG";

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON instead of human-readable lines.
/// * `level`: verbosity used when neither `CHAINRIG_LOG` nor `RUST_LOG` is set.
pub fn init_tracing(json: bool, level: Level) {
    let directive = pick_directive(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        level,
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // Exactly one of the two output layers is present.
    let (lines, ndjson) = if json {
        (None, Some(fmt::layer().with_target(false).json()))
    } else {
        (Some(fmt::layer().with_target(false)), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(lines)
        .with(ndjson)
        .try_init()
        .ok();
}

/// `CHAINRIG_LOG`, else `RUST_LOG`, else `level`. Blank values are skipped.
fn pick_directive(chainrig: Option<String>, rust_log: Option<String>, level: Level) -> String {
    [chainrig, rust_log]
        .into_iter()
        .flatten()
        .find(|d| !d.trim().is_empty())
        .unwrap_or_else(|| level.as_str().to_lowercase())
}
