//! Log output for `uxa` runs.
//!
//! `uxa scan` prints one summary line per page on stdout and writes reports
//! to disk, and scripts pipe that stdout into other tools. All diagnostics
//! therefore go to stderr. In JSON mode every line carries the `event` and
//! `scan_id` fields emitted by [`crate::obs`], so a batch of concurrent scans
//! can be split apart again by scan.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber.
///
/// `level` applies when `RUST_LOG` is unset. JSON lines include the active
/// scan span and never contain colour codes. Only the first call installs
/// anything.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let installed = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr.json().with_ansi(false).with_current_span(true).with_span_list(false))
            .try_init()
    } else {
        tracing_subscriber::registry().with(env_filter).with(stderr).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
