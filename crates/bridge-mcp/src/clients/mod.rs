//! Host client modules.
//!
//! - `config`: environment-driven [`BridgeConfig`]
//! - `host`: [`HostClient`], the reqwest implementation of the login and
//!   library fetch contracts

pub mod config;
pub mod host;

pub use config::{BridgeConfig, ConfigError};
pub use host::HostClient;
