//! Docker Compose file parsing
//!
//! This module reads docker-compose.yml back into a small summary:
//! services, container names, port mappings and networks. It is used to
//! validate generated files and to find services, containers and the web
//! port when the user has edited the file by hand.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use serde_yaml::Value;

/// Information extracted from a docker-compose.yml file
#[derive(Debug, Clone)]
pub struct ComposeInfo {
    /// Service name -> ServiceInfo
    pub services: BTreeMap<String, ServiceInfo>,
    /// Top-level network names
    pub networks: BTreeSet<String>,
    /// Top-level named volumes
    pub volumes: BTreeSet<String>,
}

/// Information about a single service
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    pub image: Option<String>,
    /// Container name (if specified, otherwise generated)
    pub container_name: Option<String>,
    /// Published ports as (host, container) pairs
    pub ports: Vec<(u16, u16)>,
    /// Networks this service is connected to
    pub networks: Vec<String>,
}

impl ComposeInfo {
    /// Parse a docker-compose.yml file
    pub fn parse(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read docker-compose file: {:?}", path))?;

        Self::from_yaml(&content)
    }

    /// Parse docker-compose YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let yaml: Value =
            serde_yaml::from_str(content).context("Failed to parse docker-compose YAML")?;

        let mut services = BTreeMap::new();

        if let Some(services_map) = yaml.get("services").and_then(|v| v.as_mapping()) {
            for (service_name, service_config) in services_map {
                let name = service_name
                    .as_str()
                    .context("Service name is not a string")?
                    .to_string();

                let image = service_config
                    .get("image")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());

                let container_name = service_config
                    .get("container_name")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());

                let service_info = ServiceInfo {
                    name: name.clone(),
                    image,
                    container_name,
                    ports: Self::parse_ports(service_config),
                    networks: Self::parse_networks(service_config),
                };

                services.insert(name, service_info);
            }
        }

        Ok(Self {
            services,
            networks: Self::top_level_keys(&yaml, "networks"),
            volumes: Self::top_level_keys(&yaml, "volumes"),
        })
    }

    fn top_level_keys(yaml: &Value, section: &str) -> BTreeSet<String> {
        yaml.get(section)
            .and_then(|v| v.as_mapping())
            .map(|map| {
                map.keys()
                    .filter_map(|k| k.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parse port mappings from a service configuration
    fn parse_ports(service_config: &Value) -> Vec<(u16, u16)> {
        let mut ports = Vec::new();

        let Some(entries) = service_config.get("ports").and_then(|v| v.as_sequence()) else {
            return ports;
        };

        for port_entry in entries {
            if let Some(port_str) = port_entry.as_str() {
                // "host:container" or "host_ip:host:container", optional "/proto"
                let parts: Vec<&str> = port_str.split(':').collect();
                let (host, container) = match parts.as_slice() {
                    [host, container] => (*host, *container),
                    [_ip, host, container] => (*host, *container),
                    _ => continue,
                };

                let container = container.split('/').next().unwrap_or(container);
                if let (Ok(host), Ok(container)) = (host.parse::<u16>(), container.parse::<u16>())
                {
                    ports.push((host, container));
                }
            } else if port_entry.is_mapping() {
                // Long syntax
                let published = port_entry.get("published").and_then(Self::as_port);
                let target = port_entry.get("target").and_then(Self::as_port);
                if let (Some(host), Some(container)) = (published, target) {
                    ports.push((host, container));
                }
            }
        }

        ports
    }

    fn as_port(value: &Value) -> Option<u16> {
        if let Some(port) = value.as_u64() {
            u16::try_from(port).ok()
        } else {
            value.as_str().and_then(|s| s.parse().ok())
        }
    }

    /// Parse networks from a service configuration
    fn parse_networks(service_config: &Value) -> Vec<String> {
        let mut networks = Vec::new();

        if let Some(networks_value) = service_config.get("networks") {
            if let Some(networks_seq) = networks_value.as_sequence() {
                // Array format: ["network1", "network2"]
                for network in networks_seq {
                    if let Some(network_str) = network.as_str() {
                        networks.push(network_str.to_string());
                    }
                }
            } else if let Some(networks_map) = networks_value.as_mapping() {
                // Map format: { network1: {}, network2: {} }
                for (network_name, _) in networks_map {
                    if let Some(network_str) = network_name.as_str() {
                        networks.push(network_str.to_string());
                    }
                }
            }
        }

        networks
    }

    pub fn service(&self, name: &str) -> Option<&ServiceInfo> {
        self.services.get(name)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    /// Container name of a service (explicit or Compose-generated)
    pub fn container_name(&self, service: &str, project_name: &str) -> Option<String> {
        self.services.get(service).map(|info| {
            info.container_name
                .clone()
                .unwrap_or_else(|| format!("{}-{}-1", project_name, info.name))
        })
    }

    /// Host port published for a container port of a service
    pub fn host_port(&self, service: &str, container_port: u16) -> Option<u16> {
        self.services.get(service).and_then(|info| {
            info.ports
                .iter()
                .find(|(_, target)| *target == container_port)
                .map(|(host, _)| *host)
        })
    }
}
