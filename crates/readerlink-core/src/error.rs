use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Vocabulary errors
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("msg.payload isn't a string: {0}")]
    PayloadNotString(String),

    #[error("Invalid region code: {0}")]
    InvalidRegion(String),

    // State machine errors
    #[error("Invalid state transition from {from} on {event}")]
    InvalidStateTransition { from: String, event: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
