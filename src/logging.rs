use tracing_subscriber::{fmt, EnvFilter};

/// Initializes console logging on stderr.
///
/// `RUST_LOG` wins when set; otherwise `verbosity` picks the crate level
/// (0 = info, 1 = debug, 2+ = trace). stdout stays free for JSON output.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,disclosure_rollup={}", level)));

    // Ignore the error if a subscriber is already installed (tests, embedding)
    let _ = fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .try_init();
}
