//! Cluster topology and transport options.

use crate::error::ClusterError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Ucx,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Ucx => "ucx",
        })
    }
}

/// Which network interfaces UCX workers bind to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetDevices {
    Auto,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub protocol: Protocol,
    pub enable_tcp_over_ucx: bool,
    pub enable_nvlink: bool,
    pub enable_infiniband: bool,
    pub net_devices: Option<NetDevices>,
    /// Create a device context in each worker before it accepts work.
    pub create_device_context: bool,
    pub n_workers: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::tcp()
    }
}

impl ClusterConfig {
    /// Plain cluster over TCP.
    pub fn tcp() -> Self {
        Self {
            protocol: Protocol::Tcp,
            enable_tcp_over_ucx: false,
            enable_nvlink: false,
            enable_infiniband: false,
            net_devices: None,
            create_device_context: false,
            n_workers: default_workers(),
        }
    }

    /// UCX transport with automatic device selection; interconnects stay
    /// off unless enabled explicitly.
    pub fn ucx() -> Self {
        Self {
            protocol: Protocol::Ucx,
            net_devices: Some(NetDevices::Auto),
            create_device_context: true,
            ..Self::tcp()
        }
    }

    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        self
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.n_workers == 0 {
            return Err(ClusterError::NoWorkers);
        }
        if self.protocol != Protocol::Ucx {
            let ucx_only = [
                ("enable_tcp_over_ucx", self.enable_tcp_over_ucx),
                ("enable_nvlink", self.enable_nvlink),
                ("enable_infiniband", self.enable_infiniband),
                ("net_devices", self.net_devices.is_some()),
            ];
            if let Some((option, _)) = ucx_only.iter().find(|(_, set)| *set) {
                return Err(ClusterError::RequiresUcx { option: *option });
            }
        }
        if matches!(&self.net_devices, Some(NetDevices::Named(devices)) if devices.is_empty()) {
            return Err(ClusterError::EmptyNetDevices);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        ClusterConfig::tcp().validate().unwrap();
        let ucx = ClusterConfig::ucx();
        ucx.validate().unwrap();
        assert_eq!(ucx.net_devices, Some(NetDevices::Auto));
        assert!(!ucx.enable_nvlink && !ucx.enable_infiniband && !ucx.enable_tcp_over_ucx);
    }

    #[test]
    fn interconnects_require_ucx() {
        let config = ClusterConfig {
            enable_nvlink: true,
            ..ClusterConfig::tcp()
        };
        assert!(matches!(
            config.validate(),
            Err(ClusterError::RequiresUcx { option: "enable_nvlink" })
        ));

        let config = ClusterConfig {
            enable_nvlink: true,
            ..ClusterConfig::ucx()
        };
        config.validate().unwrap();
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(
            ClusterConfig::tcp().with_workers(0).validate(),
            Err(ClusterError::NoWorkers)
        ));
    }

    #[test]
    fn named_devices_must_not_be_empty() {
        let config = ClusterConfig {
            net_devices: Some(NetDevices::Named(Vec::new())),
            ..ClusterConfig::ucx()
        };
        assert!(matches!(config.validate(), Err(ClusterError::EmptyNetDevices)));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ClusterConfig {
            net_devices: Some(NetDevices::Named(vec!["mlx5_0:1".into()])),
            enable_infiniband: true,
            ..ClusterConfig::ucx().with_workers(2)
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ClusterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);

        let partial: ClusterConfig = serde_json::from_str(r#"{"protocol":"ucx","n_workers":3}"#).unwrap();
        assert_eq!(partial.protocol, Protocol::Ucx);
        assert_eq!(partial.n_workers, 3);
    }
}
