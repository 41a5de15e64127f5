use std::io;

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `hoard=debug`
pub const LOG_ENV: &str = "HOARD_LOG";

/// Install a stderr subscriber so log lines never mix with report output.
///
/// `HOARD_LOG` wins when set; otherwise `warn`, or `info` when verbose.
pub fn init(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
