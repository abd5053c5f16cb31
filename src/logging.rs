use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CRM_LOG";

/// Installs the stderr subscriber. `CRM_LOG` takes an `EnvFilter` directive;
/// without it the level is `warn`, or `debug` for this crate with `--verbose`.
pub fn init(verbose: bool) {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(default_directives(verbose)),
    };

    // A subscriber may already be installed when running under a test harness.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,crm_batch=debug"
    } else {
        "warn"
    }
}
