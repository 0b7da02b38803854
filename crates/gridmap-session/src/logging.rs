//! Logging setup.
//!
//! Log output goes to stderr so that command output on stdout stays
//! machine-readable. The level is read from `GRIDMAP_LOG` using the usual
//! `EnvFilter` directive syntax, e.g. `GRIDMAP_LOG=gridmap_session=debug`.

use tracing_subscriber::{fmt, prelude::*, registry::Registry, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "GRIDMAP_LOG";

/// Default directive when `GRIDMAP_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_directive(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Fails if a subscriber was already installed.
///
/// # Example
/// ```ignore
/// gridmap_session::logging::init_logging(false)?;
/// ```
pub fn init_logging(verbose: bool) -> Result<()> {
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(verbose);

    Registry::default()
        .with(env_filter(verbose))
        .with(console_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {e}")))
}
