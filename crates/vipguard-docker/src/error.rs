//! Container runtime errors.

use thiserror::Error;

use vipguard_core::http::TransportError;

pub type ContainerResult<T> = Result<T, ContainerError>;

#[derive(Debug, Error)]
pub enum ContainerError {
    /// No container matches the image prefix, or the id no longer exists.
    #[error("container not found: {0}")]
    NotFound(String),

    /// The runtime answered with a non-success status.
    #[error("container runtime returned {status} for {operation}: {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("container runtime unreachable: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to decode runtime response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}
