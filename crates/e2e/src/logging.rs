//! Console logging setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber; later calls are ignored.
///
/// `verbose` forces `debug`, otherwise `RUST_LOG` applies with `info` as
/// the fallback.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter(verbose))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_forces_debug() {
        assert_eq!(filter(true).to_string(), "debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(false);
        init(true);
    }
}
