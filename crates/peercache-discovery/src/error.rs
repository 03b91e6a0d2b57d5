//! Discovery subsystem errors.

use peercache_protocol::{ProtocolError, ValidationError};
use thiserror::Error;

/// Which socket operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStep {
    Create,
    Configure,
    Bind,
    JoinGroup,
    Send,
    Receive,
}

impl std::fmt::Display for SocketStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create socket"),
            Self::Configure => write!(f, "configure socket"),
            Self::Bind => write!(f, "bind"),
            Self::JoinGroup => write!(f, "join multicast group"),
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to {step}: {source}")]
    Socket {
        step: SocketStep,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed packet: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid field: {0}")]
    Validation(#[from] ValidationError),

    #[error("host taken: {0}")]
    HostTaken(String),

    #[error("instance taken: {0}")]
    InstanceTaken(String),

    #[error("did not find SRV record for service: {0}")]
    SrvNotFound(String),

    /// Carries the SRV record rendered as JSON.
    #[error("did not find A record for SRV: {0}")]
    ARecordNotFound(String),

    #[error("failed to enumerate network interfaces: {0}")]
    Interfaces(#[source] std::io::Error),

    #[error("no IPv4 interface to advertise on")]
    NoInterfaces,

    #[error("engine not running")]
    NotRunning,

    #[error("engine already running")]
    AlreadyRunning,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DiscoveryError {
    pub(crate) fn socket(step: SocketStep) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Socket { step, source }
    }
}
