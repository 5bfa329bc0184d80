//! Shared pieces of the demo binaries: backend selection and log setup.

pub mod backend;

pub use backend::{create_device, get_backend_name, SelectedBackend, SelectedDevice};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, at `verbose` level or `INFO`
/// when the variable is unset.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(if verbose {
            LevelFilter::DEBUG.into()
        } else {
            LevelFilter::INFO.into()
        })
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
