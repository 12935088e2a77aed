//! Runtime configuration.
//!
//! Loaded from the environment (with `.env` support for development).
//! `SCORESYNC_API_URL` is the only required setting; storage directories
//! default to the platform data dir for the durable tier and a
//! per-process temp directory for the session tier.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application name used for storage directory paths.
const APP_NAME: &str = "scoresync";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the scoring API.
    pub api_base_url: String,
    /// Directory for caches that survive restarts (team rosters).
    pub durable_dir: PathBuf,
    /// Directory for session-scoped caches, distinct per process so two
    /// sessions never replicate into each other.
    pub session_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine; real deployments set the environment.
        let _ = dotenvy::dotenv();

        let api_base_url =
            std::env::var("SCORESYNC_API_URL").context("SCORESYNC_API_URL must be set")?;

        let durable_dir = match std::env::var_os("SCORESYNC_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("Could not find data directory")?
                .join(APP_NAME),
        };

        let session_dir = match std::env::var_os("SCORESYNC_SESSION_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir()
                .join(APP_NAME)
                .join(format!("session-{}", std::process::id())),
        };

        Ok(Self {
            api_base_url,
            durable_dir,
            session_dir,
        })
    }
}
