//! vipguard-core: shared types, configuration, and HTTP transport.
//!
//! Every other vipguard crate builds on this one:
//!
//! - **`types`**: node role, health status, MAC address, VIP claim
//! - **`config`**: `HaConfig` TOML model, loading, and start-up validation
//! - **`http`**: minimal hyper HTTP/1 client over TCP or a unix socket
//! - **`error`**: configuration errors (fatal at start-up)

pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use config::{
    CONTAINER_RESTART_TIMEOUT, HaConfig, PrimaryConfig, ProxyConfig, VipConfig, parse_duration,
};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
