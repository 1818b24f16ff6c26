//! Transport error types

use thiserror::Error;

/// Step link errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded or decoded
    #[error("codec error: {message}")]
    Codec { message: String },

    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// Peer closed the connection mid-call
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Server answered with an error
    #[error("remote error (fatal: {fatal}): {message}")]
    Remote { message: String, fatal: bool },

    /// Sensor attach refused by the world engine
    #[error("sensor rejected: {message}")]
    Rejected { message: String },

    #[error("unexpected response, expected {expected}")]
    UnexpectedResponse { expected: &'static str },
}

impl TransportError {
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Whether the remote co-simulation has stopped
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Remote { fatal, .. } => *fatal,
            TransportError::Io(_) | TransportError::ConnectionClosed => true,
            _ => false,
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, TransportError>;
