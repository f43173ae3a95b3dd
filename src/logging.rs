use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "KIRA_LOG";

/// Installs the stderr subscriber. `KIRA_LOG` (or `RUST_LOG`) wins over the
/// verbosity flag.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
