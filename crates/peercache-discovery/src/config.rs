//! Discovery engine settings.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default port. Deliberately not the IANA mDNS port 5353, which the
/// platform's own responder usually holds.
pub const DEFAULT_PORT: u16 = 53531;

/// The mDNS IPv4 multicast group.
pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Network and RFC 6762 timing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_group")]
    pub group: Ipv4Addr,
    #[serde(default = "default_bind")]
    pub bind: Ipv4Addr,
    #[serde(default = "default_true")]
    pub multicast_loop: bool,
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,
    /// TTL in seconds put on every record we publish.
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,
    #[serde(default = "default_response_wait_min_ms")]
    pub response_wait_min_ms: u64,
    #[serde(default = "default_response_wait_max_ms")]
    pub response_wait_max_ms: u64,
    #[serde(default = "default_probe_count")]
    pub probe_count: u32,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_probe_initial_delay_max_ms")]
    pub probe_initial_delay_max_ms: u64,
    #[serde(default = "default_announce_count")]
    pub announce_count: u32,
    #[serde(default = "default_announce_interval_ms")]
    pub announce_interval_ms: u64,
    #[serde(default = "default_query_round_timeout_ms")]
    pub query_round_timeout_ms: u64,
    #[serde(default = "default_query_retries")]
    pub query_retries: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            group: default_group(),
            bind: default_bind(),
            multicast_loop: true,
            multicast_ttl: default_multicast_ttl(),
            record_ttl: default_record_ttl(),
            response_wait_min_ms: default_response_wait_min_ms(),
            response_wait_max_ms: default_response_wait_max_ms(),
            probe_count: default_probe_count(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_initial_delay_max_ms: default_probe_initial_delay_max_ms(),
            announce_count: default_announce_count(),
            announce_interval_ms: default_announce_interval_ms(),
            query_round_timeout_ms: default_query_round_timeout_ms(),
            query_retries: default_query_retries(),
        }
    }
}

impl DiscoveryConfig {
    /// Where multicast traffic goes.
    pub fn multicast_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }

    pub fn bind_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.bind, self.port)
    }

    /// Responder delay bounds, normalised so that `min <= max`.
    pub fn response_wait(&self) -> (Duration, Duration) {
        let min = self.response_wait_min_ms.min(self.response_wait_max_ms);
        let max = self.response_wait_min_ms.max(self.response_wait_max_ms);
        (Duration::from_millis(min), Duration::from_millis(max))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_initial_delay_max(&self) -> Duration {
        Duration::from_millis(self.probe_initial_delay_max_ms)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    pub fn query_round_timeout(&self) -> Duration {
        Duration::from_millis(self.query_round_timeout_ms)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_group() -> Ipv4Addr {
    MDNS_GROUP
}

fn default_bind() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_true() -> bool {
    true
}

fn default_multicast_ttl() -> u32 {
    255
}

fn default_record_ttl() -> u32 {
    peercache_protocol::DEFAULT_TTL
}

fn default_response_wait_min_ms() -> u64 {
    200
}

fn default_response_wait_max_ms() -> u64 {
    600
}

fn default_probe_count() -> u32 {
    3
}

fn default_probe_interval_ms() -> u64 {
    250
}

fn default_probe_initial_delay_max_ms() -> u64 {
    250
}

fn default_announce_count() -> u32 {
    2
}

fn default_announce_interval_ms() -> u64 {
    1000
}

fn default_query_round_timeout_ms() -> u64 {
    1000
}

fn default_query_retries() -> u32 {
    2
}
