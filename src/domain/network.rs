// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Address range of the legacy network that still reaches databases and services
pub const LEGACY_VPC_CIDR: &str = "10.0.0.0/16";

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4, 0-128 for IPv6)")]
    InvalidPrefixLength(u8),

    #[error("CIDR {cidr} has host bits set; the network address is {network}")]
    HostBitsSet { cidr: String, network: String },

    #[error("Invalid port range: {from}-{to} (must be 1-65535, from <= to)")]
    InvalidPortRange { from: u16, to: u16 },
}

/// CIDR block value object
///
/// Invariants:
/// - Valid IP address format
/// - Prefix length present and within range for the address family
/// - Address is the network address: no bits set past the prefix
///
/// # Examples
///
/// ```rust
/// use iac_stacks::domain::CidrBlock;
///
/// let block = CidrBlock::new("10.10.0.0/16").unwrap();
/// assert_eq!(block.prefix_length(), 16);
/// assert_eq!(block.to_string(), "10.10.0.0/16");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock {
    address: IpAddr,
    prefix_length: u8,
}

impl CidrBlock {
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let address = IpAddr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        let max_prefix = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        if prefix_length > max_prefix {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        let network = network_address(address, prefix_length);
        if network != address {
            return Err(NetworkError::HostBitsSet {
                cidr: cidr.to_string(),
                network: format!("{}/{}", network, prefix_length),
            });
        }

        Ok(Self {
            address,
            prefix_length,
        })
    }

    /// Matches every IPv4 address
    pub fn any_ipv4() -> Self {
        Self {
            address: IpAddr::from([0, 0, 0, 0]),
            prefix_length: 0,
        }
    }

    /// The legacy network range
    pub fn legacy() -> Self {
        Self {
            address: IpAddr::from([10, 0, 0, 0]),
            prefix_length: 16,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.address, IpAddr::V4(_))
    }

    /// Whether `other` lies entirely inside this block
    pub fn contains(&self, other: &CidrBlock) -> bool {
        self.is_ipv4() == other.is_ipv4()
            && other.prefix_length >= self.prefix_length
            && network_address(other.address, self.prefix_length) == self.address
    }
}

/// `address` with every bit past `prefix_length` cleared
fn network_address(address: IpAddr, prefix_length: u8) -> IpAddr {
    match address {
        IpAddr::V4(v4) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix_length)).unwrap_or(0);
            IpAddr::from((u32::from(v4) & mask).to_be_bytes())
        }
        IpAddr::V6(v6) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix_length)).unwrap_or(0);
            IpAddr::from((u128::from(v6) & mask).to_be_bytes())
        }
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_length)
    }
}

impl FromStr for CidrBlock {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

/// Transport protocol of a security group rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    All,
}

impl Protocol {
    /// Provider protocol identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::All => "-1",
        }
    }
}

/// Port range value object
///
/// Invariants:
/// - Ports are 1-65535 and `from <= to` (except the all-traffic range)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    protocol: Protocol,
    from: u16,
    to: u16,
}

impl PortRange {
    pub fn tcp(port: u16) -> Result<Self, NetworkError> {
        Self::tcp_range(port, port)
    }

    pub fn tcp_range(from: u16, to: u16) -> Result<Self, NetworkError> {
        if from == 0 || from > to {
            return Err(NetworkError::InvalidPortRange { from, to });
        }
        Ok(Self {
            protocol: Protocol::Tcp,
            from,
            to,
        })
    }

    /// TCP 443
    pub fn https() -> Self {
        Self::well_known(443)
    }

    /// TCP 80
    pub fn http() -> Self {
        Self::well_known(80)
    }

    /// TCP 5432
    pub fn postgres() -> Self {
        Self::well_known(5432)
    }

    const fn well_known(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from: port,
            to: port,
        }
    }

    /// Every protocol, every port
    pub fn all_traffic() -> Self {
        Self {
            protocol: Protocol::All,
            from: 0,
            to: 65535,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn from_port(&self) -> u16 {
        self.from
    }

    pub fn to_port(&self) -> u16 {
        self.to
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::All => write!(f, "all traffic"),
            _ if self.from == self.to => write!(f, "{} {}", self.protocol.as_str(), self.from),
            _ => write!(f, "{} {}-{}", self.protocol.as_str(), self.from, self.to),
        }
    }
}

/// Source or destination of a security group rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Peer {
    /// An IPv4 CIDR block
    Ipv4(CidrBlock),
    /// A security group, referenced by id token
    SecurityGroup(Value),
}

impl Peer {
    pub fn any_ipv4() -> Self {
        Peer::Ipv4(CidrBlock::any_ipv4())
    }

    /// Provider rule fields identifying this peer
    pub fn rule_fields(&self, direction: RuleDirection) -> Value {
        match (self, direction) {
            (Peer::Ipv4(block), _) => json!({ "CidrIp": block.to_string() }),
            (Peer::SecurityGroup(id), RuleDirection::Ingress) => {
                json!({ "SourceSecurityGroupId": id })
            }
            (Peer::SecurityGroup(id), RuleDirection::Egress) => {
                json!({ "DestinationSecurityGroupId": id })
            }
        }
    }
}

/// Direction of a security group rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleDirection {
    Ingress,
    Egress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cidr_blocks() {
        assert!(CidrBlock::new("10.0.0.0/16").is_ok());
        assert!(CidrBlock::new("0.0.0.0/0").is_ok());
        assert!(CidrBlock::new("2001:db8::/32").is_ok());
    }

    #[test]
    fn test_invalid_cidr_blocks() {
        assert!(matches!(
            CidrBlock::new("10.0.0.0"),
            Err(NetworkError::InvalidCidr(_))
        ));
        assert!(matches!(
            CidrBlock::new("10.0.0.300/16"),
            Err(NetworkError::InvalidIpAddress(_))
        ));
        assert_eq!(
            CidrBlock::new("10.0.0.0/33"),
            Err(NetworkError::InvalidPrefixLength(33))
        );
    }

    #[test]
    fn test_host_bits_are_rejected() {
        assert_eq!(
            CidrBlock::new("10.20.255.1/16"),
            Err(NetworkError::HostBitsSet {
                cidr: "10.20.255.1/16".to_string(),
                network: "10.20.0.0/16".to_string(),
            })
        );
        assert!(CidrBlock::new("192.168.1.7/32").is_ok());
        assert!(matches!(
            CidrBlock::new("2001:db8::1/64"),
            Err(NetworkError::HostBitsSet { .. })
        ));
    }

    #[test]
    fn test_contains() {
        let vpc = CidrBlock::new("10.20.0.0/16").unwrap();
        assert!(vpc.contains(&CidrBlock::new("10.20.3.0/24").unwrap()));
        assert!(vpc.contains(&vpc));
        assert!(!vpc.contains(&CidrBlock::new("10.21.0.0/24").unwrap()));
        assert!(!vpc.contains(&CidrBlock::new("10.0.0.0/8").unwrap()));
        assert!(CidrBlock::any_ipv4().contains(&vpc));
    }

    #[test]
    fn test_legacy_cidr_matches_constant() {
        assert_eq!(CidrBlock::legacy().to_string(), LEGACY_VPC_CIDR);
        assert_eq!(CidrBlock::any_ipv4().to_string(), "0.0.0.0/0");
    }

    #[test]
    fn test_cidr_serde_round_trip() {
        let block = CidrBlock::new("172.16.0.0/12").unwrap();
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, "\"172.16.0.0/12\"");
        assert!(serde_json::from_str::<CidrBlock>("\"nope\"").is_err());
    }

    #[test]
    fn test_port_ranges() {
        let postgres = PortRange::tcp(5432).unwrap();
        assert_eq!(postgres.to_string(), "tcp 5432");
        assert!(PortRange::tcp_range(10, 5).is_err());
        assert!(PortRange::tcp(0).is_err());
        assert_eq!(PortRange::all_traffic().protocol().as_str(), "-1");
    }

    #[test]
    fn test_peer_rule_fields() {
        let peer = Peer::SecurityGroup(json!({ "Ref": "Sg" }));
        assert_eq!(
            peer.rule_fields(RuleDirection::Ingress),
            json!({ "SourceSecurityGroupId": { "Ref": "Sg" } })
        );
        assert_eq!(
            Peer::any_ipv4().rule_fields(RuleDirection::Egress),
            json!({ "CidrIp": "0.0.0.0/0" })
        );
    }
}
