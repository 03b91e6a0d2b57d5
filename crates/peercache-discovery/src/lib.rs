//! mDNS/DNS-SD discovery for peercache peers.
//!
//! [`Engine`] owns the multicast socket and the authoritative record store.
//! It answers queries for the records it registered, probes names before
//! claiming them, and browses and resolves other peers' services.

pub mod browse;
pub mod config;
pub mod engine;
pub mod error;
pub mod interfaces;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod probe;
pub mod query;
pub mod register;
pub mod responder;
pub mod session;
pub mod socket;
pub mod store;
pub mod transport;

pub use browse::ResolvedService;
pub use config::{DiscoveryConfig, DEFAULT_PORT, MDNS_GROUP};
pub use engine::Engine;
pub use error::{DiscoveryError, SocketStep};
pub use interfaces::{InterfaceSource, Ipv4Interface, StaticInterfaces, SystemInterfaces};
pub use probe::ProbeOutcome;
pub use query::QueryOptions;
pub use register::{Registration, RegistrationState, ServiceAdvert};
pub use socket::DatagramSocket;
