//! Daemon configuration loaded from TOML.

use peercache_discovery::{DiscoveryConfig, ServiceAdvert};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// What this node advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Host name to claim. Defaults to `<hostname>.local`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Instance label. Defaults to the short hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Port the page cache serves on. Only advertised here.
    #[serde(default = "default_node_port")]
    pub port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: None,
            instance: None,
            service_type: default_service_type(),
            port: default_node_port(),
        }
    }
}

impl NodeConfig {
    /// Fill in the host and instance defaults.
    ///
    /// A generic hostname such as `localhost` is replaced by a name derived
    /// from `node_id`, so two fresh machines do not collide.
    pub fn advert(&self, node_id: Uuid) -> ServiceAdvert {
        let short = short_hostname()
            .filter(|h| !is_generic(h))
            .unwrap_or_else(|| fallback_name(node_id));
        ServiceAdvert {
            host: self
                .host
                .clone()
                .unwrap_or_else(|| format!("{short}.local")),
            instance: self.instance.clone().unwrap_or(short),
            service_type: self.service_type.clone(),
            port: self.port,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn short_hostname() -> Option<String> {
    let name = hostname::get().ok()?.into_string().ok()?;
    let first = name.split('.').next()?.trim();
    (!first.is_empty()).then(|| first.to_ascii_lowercase())
}

fn is_generic(name: &str) -> bool {
    matches!(name, "localhost" | "localhost4" | "localhost6" | "(none)")
}

fn fallback_name(node_id: Uuid) -> String {
    let simple = node_id.simple().to_string();
    format!("peercache-{}", &simple[..8])
}

fn default_service_type() -> String {
    "_pagecache._tcp".to_string()
}

fn default_node_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("port = 53531"));
        assert!(toml_str.contains("service_type = \"_pagecache._tcp\""));
        assert!(toml_str.contains("level = \"info\""));
        assert!(!toml_str.contains("host ="));
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[discovery]
port = 6000
probe_count = 4
query_retries = 0

[node]
host = "cachebox.local"
instance = "kitchen"
port = 9000

[log]
level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.discovery.port, 6000);
        assert_eq!(config.discovery.probe_count, 4);
        assert_eq!(config.discovery.query_retries, 0);
        assert_eq!(config.discovery.record_ttl, 120);
        assert_eq!(config.node.host.as_deref(), Some("cachebox.local"));
        assert_eq!(config.node.service_type, "_pagecache._tcp");
        assert_eq!(config.log.level, "debug");

        let advert = config.node.advert(Uuid::new_v4());
        assert_eq!(advert.host, "cachebox.local");
        assert_eq!(advert.srv_name(), "kitchen._pagecache._tcp.local");
        assert_eq!(advert.port, 9000);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn defaults_derive_host_and_instance() {
        let advert = NodeConfig::default().advert(Uuid::new_v4());
        assert!(advert.host.ends_with(".local"));
        assert!(!advert.instance.is_empty());
        assert!(!advert.instance.contains('.'));
        assert_eq!(advert.host, format!("{}.local", advert.instance));
    }

    #[test]
    fn fallback_name_comes_from_node_id() {
        let id: Uuid = "6f1c2a9e-0000-4000-8000-000000000000".parse().unwrap();
        assert_eq!(fallback_name(id), "peercache-6f1c2a9e");
        assert!(is_generic("localhost"));
        assert!(!is_generic("kitchen"));
    }
}
