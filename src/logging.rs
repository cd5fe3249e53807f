use std::env;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr subscriber.
///
/// `-v` flags pick the level; without them `KINSHIP_LOG`, then `RUST_LOG`,
/// then `warn` apply.
pub fn init_logger(verbosity: u8) {
    let directive = match verbosity {
        0 => env::var("KINSHIP_LOG")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "warn".to_string()),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter_layer = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter_layer)
        .init();
}
