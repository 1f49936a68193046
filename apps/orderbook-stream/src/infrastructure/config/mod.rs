//! Configuration Module
//!
//! Environment-driven configuration for the server and client binaries.

mod settings;

use std::path::{Path, PathBuf};

pub use settings::{ClientConfig, ConfigError, ProducerSettings, ServerConfig, ServerSettings};

/// Load a `.env` file into the process environment.
///
/// Searches the current directory and its ancestors first, then falls back
/// to the workspace root this crate was built from, so binaries started
/// outside the source tree still pick up local settings. Returns the file
/// that was loaded, if any. Runs before telemetry is installed; pass the
/// result to [`log_dotenv`] once logging is up.
///
/// # Errors
///
/// Returns an error if a `.env` file exists but cannot be read or parsed.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => load_workspace_dotenv(),
        Err(e) => Err(e),
    }
}

/// Load `.env` from the workspace root recorded at build time.
fn load_workspace_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    load_from(&Path::new(env!("CARGO_MANIFEST_DIR")).join("../../.env"))
}

fn load_from(path: &Path) -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(Some(path.to_path_buf())),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Log the outcome of [`load_dotenv`].
pub fn log_dotenv(outcome: &Result<Option<PathBuf>, dotenvy::Error>) {
    match outcome {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Ok(None) => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!(error = %e, "Failed to load .env file, using process environment"),
    }
}
