//! Logging setup for the binary.

use tracing::Level;
use tracing_subscriber::EnvFilter;

fn default_level(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { Level::INFO }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the workspace crates log at `info`,
/// or `debug` with `--verbose`. Output goes to stderr so stdout stays JSON.
pub fn init_logger(verbose: bool) {
    let level = default_level(verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,exam_prep={level},services={level},storage={level},exam_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
