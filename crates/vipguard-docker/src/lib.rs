//! vipguard-docker: the managed proxy container.
//!
//! # Components
//!
//! - **`runtime`**: `ContainerRuntime` trait and the Docker Engine API client
//! - **`monitor`**: `ProcessMonitor`: resolve, health-check, and
//!   restart-then-wait for the proxy container
//!
//! Both roles use the monitor: the primary after a local config change,
//! the secondary after pulling config from the primary.

pub mod error;
pub mod monitor;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ContainerError, ContainerResult};
pub use monitor::{ProcessMonitor, RolloutAttempt};
pub use runtime::{ContainerDetails, ContainerRuntime, ContainerSummary, DockerClient};
