use std::str::FromStr;

use tracing::Level;

pub const LOG_ENV: &str = "PLUGIN_SERVE_LOG";

/// Picks the log level from the verbosity flags, then `PLUGIN_SERVE_LOG`,
/// then `warn`.
pub fn level_from(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => std::env::var(LOG_ENV)
            .ok()
            .and_then(|value| Level::from_str(value.trim()).ok())
            .unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the stderr subscriber. A second call is ignored.
pub fn init(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
