//! Tracing setup for programs embedding imgvet.
//!
//! `RUST_LOG` wins when set. Otherwise the imgvet crates log at the given
//! level and everything else at `warn`. Only the first call installs a
//! subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const IMGVET_TARGETS: [&str; 2] = ["imgvet_core", "imgvet_metadata"];

/// Default directives when `RUST_LOG` is absent.
fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(IMGVET_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the global subscriber.
///
/// * `json`: emit one JSON object per event (run ids and verdicts become
///   queryable fields).
/// * `level`: verbosity for the imgvet crates.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let text = (!json).then(|| fmt::layer().with_target(false));
    let structured = json.then(|| fmt::layer().with_target(false).json());

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(structured)
        .try_init()
        .ok();
}
