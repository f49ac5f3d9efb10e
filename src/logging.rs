//! Logging and tracing setup.
//!
//! All logs go to **stderr**. stdout belongs to the engine that spawned the
//! provider.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `hemmer_provider_dune=debug`)
//!
//! # Examples
//!
//! ```bash
//! # Show request-level detail for this crate only
//! RUST_LOG=warn,hemmer_provider_dune=debug ./provider
//! ```
//!
//! The API key is never recorded: spans skip their arguments and
//! [`Credential`](crate::config::Credential) redacts itself in `Debug`.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter_with_default(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn install(default_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter_with_default(default_level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
}

/// Initialize the default logging subscriber.
///
/// Respects `RUST_LOG` and falls back to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Initialize logging with a custom default level used when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
///
/// # Example
///
/// ```no_run
/// hemmer_provider_dune::init_logging_with_default("debug");
/// tracing::debug!("provider starting");
/// ```
pub fn init_logging_with_default(default_level: &str) {
    if let Err(e) = install(default_level) {
        panic!("failed to install tracing subscriber: {}", e);
    }
}

/// Try to initialize logging, returning false if already initialized.
///
/// Safe to call from tests that may each try to install a subscriber.
pub fn try_init_logging() -> bool {
    install("info").is_ok()
}
