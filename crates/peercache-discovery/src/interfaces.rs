//! Local IPv4 interface enumeration, used to build our A records.

use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

/// A named local IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Interface {
    pub name: String,
    pub address: Ipv4Addr,
}

/// Source of local interfaces.
pub trait InterfaceSource: Send + Sync + 'static {
    fn ipv4_interfaces(&self) -> std::io::Result<Vec<Ipv4Interface>>;
}

/// The host's interfaces, loopback excluded unless nothing else is up.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn ipv4_interfaces(&self) -> std::io::Result<Vec<Ipv4Interface>> {
        let all: Vec<Ipv4Interface> = if_addrs::get_if_addrs()?
            .into_iter()
            .filter_map(|iface| match iface.ip() {
                IpAddr::V4(address) => Some(Ipv4Interface {
                    name: iface.name,
                    address,
                }),
                IpAddr::V6(_) => None,
            })
            .collect();

        let external: Vec<Ipv4Interface> = all
            .iter()
            .filter(|i| !i.address.is_loopback())
            .cloned()
            .collect();
        debug!(total = all.len(), external = external.len(), "enumerated IPv4 interfaces");

        Ok(if external.is_empty() { all } else { external })
    }
}

/// A fixed interface list.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces(pub Vec<Ipv4Interface>);

impl StaticInterfaces {
    pub fn single(name: &str, address: Ipv4Addr) -> Self {
        Self(vec![Ipv4Interface {
            name: name.to_string(),
            address,
        }])
    }
}

impl InterfaceSource for StaticInterfaces {
    fn ipv4_interfaces(&self) -> std::io::Result<Vec<Ipv4Interface>> {
        Ok(self.0.clone())
    }
}
