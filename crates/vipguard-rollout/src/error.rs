//! Error types for rollout, fan-out, and secondary sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use vipguard_core::http::TransportError;
use vipguard_docker::ContainerError;

/// Listing the config directory failed. Only the current tick is lost.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to scan config directory: {0}")]
    Scan(#[from] walkdir::Error),

    #[error("failed to read metadata of {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single secondary could not be notified.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("secondary unreachable: {0}")]
    Transport(#[from] TransportError),

    #[error("secondary answered {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Failure of a secondary's config pull. Each variant maps to one HTTP
/// status on `POST /update-config`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("this endpoint is only available on secondary instances")]
    NotSecondary,

    #[error("primary endpoint is not configured")]
    NoPrimary,

    #[error("primary instance is not healthy, not updating configuration")]
    PrimaryUnhealthy,

    #[error("failed to retrieve {artifact} configuration from primary: {reason}")]
    Fetch { artifact: &'static str, reason: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy container not found")]
    ContainerNotFound,

    #[error("proxy container {container_id} did not become healthy within {timeout:?}")]
    HealthTimeout { container_id: String, timeout: Duration },

    #[error("container runtime error: {0}")]
    Runtime(ContainerError),
}

impl From<ContainerError> for SyncError {
    fn from(e: ContainerError) -> Self {
        if e.is_not_found() {
            SyncError::ContainerNotFound
        } else {
            SyncError::Runtime(e)
        }
    }
}
