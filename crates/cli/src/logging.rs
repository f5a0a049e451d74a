use std::io;

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `debug` or
/// `crosswalk_linkage=debug,warn`.
pub const LOG_ENV: &str = "XWALK_LOG";

/// Install the stderr subscriber. `log` records from the engine are bridged
/// through `tracing-log`. Stdout stays reserved for command output.
pub fn configure_logging(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stderr_log = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .with_filter(filter);

    // Keep whatever global subscriber is already installed.
    let _ = tracing_subscriber::registry().with(stderr_log).try_init();
}
