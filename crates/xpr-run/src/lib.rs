//! Command-line runner for the `xpr` expression language.
mod cli;

pub use cli::Cli;

use tracing_subscriber::EnvFilter;

/// Installs a stderr subscriber filtered by `XPR_LOG`, falling back to `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("XPR_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
