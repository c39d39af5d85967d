//! Scan targets

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of address a target points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    PrivateIp,
    PublicIp,
    Network,
    IpRange,
    Domain,
}

impl TargetType {
    /// Classify a raw target address.
    pub fn classify(address: &str) -> TargetType {
        if address.contains('/') {
            return TargetType::Network;
        }
        if let Some((start, end)) = address.split_once('-') {
            if start.trim().parse::<IpAddr>().is_ok() && end.trim().parse::<IpAddr>().is_ok() {
                return TargetType::IpRange;
            }
        }
        match address.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) if is_private_v4(&ip) => TargetType::PrivateIp,
            Ok(_) => TargetType::PublicIp,
            Err(_) => TargetType::Domain,
        }
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local()
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PrivateIp => "PrivateIp",
            Self::PublicIp => "PublicIp",
            Self::Network => "Network",
            Self::IpRange => "IpRange",
            Self::Domain => "Domain",
        };
        write!(f, "{}", name)
    }
}

/// A scan target. Always available to every execution of its task, so tools
/// whose only required input is `{target}` or `{host}` are runnable before
/// any finding exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    pub address: String,
    pub target_type: TargetType,
}

impl Target {
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let target_type = TargetType::classify(&address);
        Self {
            id: Uuid::new_v4(),
            address,
            target_type,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}
