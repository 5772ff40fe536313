use tracing_subscriber::EnvFilter;

/// Initialize logging for a backup run.
///
/// Events go to stderr so the final `@@REPORT_JSON@@` line on stdout stays
/// machine-parseable when the run is driven from cron. Filter precedence:
/// `RUST_LOG` when set, then the `--log-level` flag, then `info` if the
/// flag value does not parse as a filter directive.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
