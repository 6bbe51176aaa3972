use thiserror::Error;

pub type Result<T> = std::result::Result<T, P2pError>;

#[derive(Error, Debug)]
pub enum P2pError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed")]
    AuthFailed,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Multicast discovery is not active")]
    Inactive,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for P2pError {
    fn from(err: std::io::Error) -> Self {
        P2pError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for P2pError {
    fn from(err: serde_json::Error) -> Self {
        P2pError::Serialization(err.to_string())
    }
}
