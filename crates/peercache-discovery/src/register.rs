//! Claiming a host name and a service instance, then announcing them.
//!
//! Registration is a small state machine driven by probe outcomes:
//!
//! ```text
//! Idle -> ProbingHost -> ProbingInstance -> Announced
//!              |               |
//!              v               v
//!           Failed(Host)   Failed(Instance)
//! ```

use std::time::Duration;

use peercache_protocol::{Message, ResourceRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DiscoveryError;
use crate::interfaces::Ipv4Interface;
use crate::probe::ProbeOutcome;
use crate::transport::MdnsTransport;

/// Domain every name we publish lives under.
pub const LOCAL_DOMAIN: &str = "local";

/// Which probe found its name in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    Host,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    ProbingHost,
    ProbingInstance,
    Announced,
    Failed(Conflict),
}

impl RegistrationState {
    /// Leave `Idle`. Any other state is returned unchanged.
    #[must_use]
    pub fn begin(self) -> Self {
        match self {
            Self::Idle => Self::ProbingHost,
            other => other,
        }
    }

    /// Apply the outcome of the probe the current state is waiting on.
    #[must_use]
    pub fn advance(self, outcome: ProbeOutcome) -> Self {
        match (self, outcome) {
            (Self::ProbingHost, ProbeOutcome::Free) => Self::ProbingInstance,
            (Self::ProbingHost, ProbeOutcome::Taken) => Self::Failed(Conflict::Host),
            (Self::ProbingInstance, ProbeOutcome::Free) => Self::Announced,
            (Self::ProbingInstance, ProbeOutcome::Taken) => Self::Failed(Conflict::Instance),
            (other, _) => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Announced | Self::Failed(_))
    }
}

/// What to advertise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAdvert {
    /// Fully qualified host name, e.g. `laptop.local`.
    pub host: String,
    /// Instance label, e.g. `alice`.
    pub instance: String,
    /// Service type without the domain, e.g. `_pagecache._tcp`.
    pub service_type: String,
    pub port: u16,
}

impl ServiceAdvert {
    /// `<instance>.<service_type>.local`
    pub fn srv_name(&self) -> String {
        format!("{}.{}.{LOCAL_DOMAIN}", self.instance, self.service_type)
    }

    /// The records announcing this service from `interfaces`.
    ///
    /// One A record per interface, then the SRV, then the PTR.
    pub fn records(&self, interfaces: &[Ipv4Interface], ttl: u32) -> Vec<ResourceRecord> {
        let srv_name = self.srv_name();
        interfaces
            .iter()
            .map(|iface| ResourceRecord::a(self.host.clone(), iface.address, ttl))
            .chain([
                ResourceRecord::srv(srv_name.clone(), 0, 0, self.port, self.host.clone(), ttl),
                ResourceRecord::ptr(self.service_type.clone(), srv_name, ttl),
            ])
            .collect()
    }
}

/// A service this node now answers for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub service_name: String,
    pub service_type: String,
    pub domain: String,
    pub port: u16,
}

impl Registration {
    pub fn from_advert(advert: &ServiceAdvert) -> Self {
        Self {
            service_name: advert.instance.clone(),
            service_type: advert.service_type.clone(),
            domain: LOCAL_DOMAIN.to_string(),
            port: advert.port,
        }
    }
}

/// The error a failed registration reports.
pub fn conflict_error(conflict: Conflict, advert: &ServiceAdvert) -> DiscoveryError {
    match conflict {
        Conflict::Host => DiscoveryError::HostTaken(advert.host.clone()),
        Conflict::Instance => DiscoveryError::InstanceTaken(advert.instance.clone()),
    }
}

/// Multicast `records` once now, then `count - 1` more times `interval`
/// apart in the background (RFC 6762 §8.3).
///
/// Only the first send is awaited. Repeats stop once the transport closes.
pub async fn announce(
    transport: &MdnsTransport,
    records: Vec<ResourceRecord>,
    count: u32,
    interval: Duration,
) -> Result<(), DiscoveryError> {
    let announcement = Message::response(records);
    transport.send_multicast(&announcement).await?;
    debug!(records = announcement.answers.len(), "announced");

    if count > 1 {
        let transport = transport.clone();
        tokio::spawn(async move {
            for repeat in 1..count {
                tokio::time::sleep(interval).await;
                if transport.is_closed() {
                    return;
                }
                if let Err(e) = transport.send_multicast(&announcement).await {
                    warn!(error = %e, repeat, "re-announcement failed");
                    return;
                }
                debug!(repeat, "re-announced");
            }
        });
    }
    Ok(())
}

pub(crate) fn log_state(advert: &ServiceAdvert, state: RegistrationState) {
    match state {
        RegistrationState::Announced => {
            info!(instance = %advert.instance, host = %advert.host, port = advert.port, "service registered");
        }
        RegistrationState::Failed(conflict) => {
            info!(instance = %advert.instance, host = %advert.host, ?conflict, "registration failed");
        }
        other => debug!(instance = %advert.instance, state = ?other, "registration progressing"),
    }
}
