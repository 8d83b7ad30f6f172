//! Client identification for rate limiting.
//!
//! Forwarding headers are attacker-controlled unless they were written by a
//! proxy we operate. They are read only when the directly connected peer is
//! inside a configured trusted range; otherwise the peer address is the
//! client.

use axum::http::HeaderMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Rate-limit key used when the peer address is not available.
pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Invalid trusted-proxy entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CidrParseError {
    #[error("invalid address in '{0}'")]
    InvalidAddress(String),

    #[error("invalid prefix length in '{0}'")]
    InvalidPrefix(String),
}

/// An address range in CIDR form. A bare address is a host route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNet {
    network: IpAddr,
    prefix: u8,
}

impl IpNet {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = v4_mask(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = v6_mask(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn v4_mask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn v6_mask(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

impl FromStr for IpNet {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr = IpAddr::from_str(addr_part)
            .map_err(|_| CidrParseError::InvalidAddress(s.to_string()))?
            .to_canonical();
        let max_prefix: u8 = if addr.is_ipv4() { 32 } else { 128 };

        let prefix = match prefix_part {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max_prefix)
                .ok_or_else(|| CidrParseError::InvalidPrefix(s.to_string()))?,
            None => max_prefix,
        };

        let network = match addr {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & v4_mask(prefix))),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & v6_mask(prefix))),
        };

        Ok(Self { network, prefix })
    }
}

impl fmt::Display for IpNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Statically configured set of proxy ranges whose forwarding headers are
/// believed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    ranges: Vec<IpNet>,
}

impl TrustedProxies {
    pub fn new(ranges: Vec<IpNet>) -> Self {
        Self { ranges }
    }

    /// Parse a comma-separated list. Empty entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first entry that is not a valid address or CIDR.
    pub fn parse_list(list: &str) -> Result<Self, CidrParseError> {
        let ranges = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(IpNet::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[IpNet] {
        &self.ranges
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }

    /// Rate-limit key for a request from `peer` carrying `headers`.
    ///
    /// - no peer: [`UNKNOWN_CLIENT`]
    /// - untrusted peer: the peer, all forwarding headers ignored
    /// - trusted peer: walk `X-Forwarded-For` right to left past trusted
    ///   hops and take the first untrusted address; an unparseable hop ends
    ///   the walk. Failing that, a valid `X-Real-IP`, then the peer
    pub fn client_identity(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> String {
        let Some(peer) = peer else {
            return UNKNOWN_CLIENT.to_string();
        };
        let peer = peer.to_canonical();

        if !self.is_trusted(peer) {
            return peer.to_string();
        }

        if let Some(ip) = self.from_forwarded_for(headers) {
            return ip.to_string();
        }

        if let Some(ip) = headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| IpAddr::from_str(v.trim()).ok())
        {
            return ip.to_canonical().to_string();
        }

        peer.to_string()
    }

    fn from_forwarded_for(&self, headers: &HeaderMap) -> Option<IpAddr> {
        // Multiple header lines form one list in order
        let hops: Vec<&str> = headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .collect();

        for hop in hops.iter().rev() {
            let ip = IpAddr::from_str(hop).ok()?.to_canonical();
            if !self.is_trusted(ip) {
                return Some(ip);
            }
        }
        None
    }
}
