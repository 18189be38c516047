//! Diagnostic tracing to stderr.
//!
//! Tracing is for watching a run as it happens. The durable record of a run is
//! the report directory (`io/report`), which is written regardless of the
//! filter level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbosity` (the count of `-v` flags)
/// picks the level: 0 `warn`, 1 `info`, 2 `debug`, 3+ `trace`.
///
/// # Example
/// ```bash
/// RUST_LOG=designer::controller=debug designer run -i targets.csv -o out
/// ```
pub fn init(verbosity: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::level;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level(0), "warn");
        assert_eq!(level(1), "info");
        assert_eq!(level(2), "debug");
        assert_eq!(level(7), "trace");
    }
}
