//! Error types for the dispatcher.
//!
//! Only resource exhaustion and construction-time problems surface as
//! errors. Transport hiccups, rate limiting, quota errors and rejected
//! prompts are absorbed by the request executor.

use thiserror::Error;

/// Errors that can escape a dispatcher call.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Every configured API key has been marked as quota-exhausted.
    #[error("All keys have insufficient quota")]
    AllCredentialsInvalid,

    /// The retry budget ran out without a usable response.
    #[error("Calling the inference API failed after retrying {attempts} times, check the logs for details")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// An `ENV` sentinel pointed at a variable that is not set.
    #[error("Environment variable {0} is not set")]
    MissingEnv(String),

    /// Configuration rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file or environment overlay could not be read.
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration file could not be opened.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Request body could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A dispatch worker panicked or was cancelled.
    #[error("Dispatch worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DispatchError {
    /// Whether this error means the dispatcher cannot make progress anymore.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            DispatchError::AllCredentialsInvalid | DispatchError::RetriesExhausted { .. }
        )
    }
}

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
