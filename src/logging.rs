//! Tracing subscriber for the command-line driver.
//!
//! The library only emits events; installing a subscriber is left to the
//! binary (or any embedding application).

use std::sync::OnceLock;

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs a stderr fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Subsequent calls are no-ops. Fails only if another global subscriber was
/// installed by someone else.
pub fn init() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let subscriber = Registry::default()
        .with(build_env_filter())
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = INSTALLED.set(());
    Ok(())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
