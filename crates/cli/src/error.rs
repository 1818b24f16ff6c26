//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration or catalog rejected
    #[error("Invalid configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// World engine connection error
    #[error("Failed to connect to world engine at {host}:{port}: {message}")]
    WorldConnection {
        host: String,
        port: u16,
        message: String,
    },

    /// `run` without `--offline` in a build lacking a world engine client
    #[error("No world engine client in this build: rebuild with `--features real-carla` or pass --offline")]
    NoWorldEngine,

    /// Step link could not be started
    #[error("Step link failed: {0}")]
    Link(#[from] transport::TransportError),

    /// Engine failure during startup or shutdown
    #[error("Co-simulation failed: {0}")]
    Sync(#[from] sync_engine::SyncError),

    /// Metrics exporter could not be installed
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn world_connection(
        host: impl Into<String>,
        port: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::WorldConnection {
            host: host.into(),
            port,
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
