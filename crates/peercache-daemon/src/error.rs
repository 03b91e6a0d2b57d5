//! Daemon errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("discovery error: {0}")]
    Discovery(#[from] peercache_discovery::DiscoveryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
