use std::io;
use thiserror::Error;

/// Unified error type for the handshake authentication core
#[derive(Error, Debug)]
pub enum SecuredNetworkError {
    /// Host string could not be split into a usable handshake host
    #[error("Malformed handshake: {0}")]
    MalformedHandshake(String),

    /// Source address rejected by the IP allow-list
    #[error("IP address not whitelisted: {0}")]
    IpNotWhitelisted(String),

    /// Presented passphrase did not match (or was absent)
    #[error("Passphrase mismatch")]
    PassphraseMismatch,

    /// Generator input out of range
    #[error("Invalid passphrase length: {0}")]
    InvalidPassphraseLength(i64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SecuredNetworkError>;

impl From<anyhow::Error> for SecuredNetworkError {
    fn from(err: anyhow::Error) -> Self {
        SecuredNetworkError::Other(err.to_string())
    }
}

impl From<serde_yaml::Error> for SecuredNetworkError {
    fn from(err: serde_yaml::Error) -> Self {
        SecuredNetworkError::Config(format!("YAML parse error: {}", err))
    }
}
