use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Size of one server list entry: 16 address bytes plus a big-endian port.
pub const SERVER_ENTRY_SIZE: usize = 18;

const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF];

/// Game server endpoint in canonical form.
///
/// IPv4-mapped IPv6 addresses are folded into plain IPv4 so that the same
/// host reported through both address families deduplicates to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ServerAddress(SocketAddr);

impl ServerAddress {
    pub fn new(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        };
        Self(SocketAddr::new(ip, addr.port()))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Reads one 18-byte server list entry.
    pub fn from_entry(entry: &[u8; SERVER_ENTRY_SIZE]) -> Self {
        let mut ip = [0u8; 16];
        ip.copy_from_slice(&entry[..16]);
        let port = u16::from_be_bytes([entry[16], entry[17]]);
        Self::new(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(ip)), port))
    }

    /// Writes the 18-byte server list entry for this address.
    pub fn to_entry(&self) -> [u8; SERVER_ENTRY_SIZE] {
        let mut entry = [0u8; SERVER_ENTRY_SIZE];
        match self.0.ip() {
            IpAddr::V4(v4) => {
                entry[..12].copy_from_slice(&IPV4_MAPPED_PREFIX);
                entry[12..16].copy_from_slice(&v4.octets());
            }
            IpAddr::V6(v6) => entry[..16].copy_from_slice(&v6.octets()),
        }
        entry[16..].copy_from_slice(&self.0.port().to_be_bytes());
        entry
    }
}

impl From<SocketAddr> for ServerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl From<ServerAddress> for SocketAddr {
    fn from(addr: ServerAddress) -> Self {
        addr.0
    }
}

impl From<ServerAddress> for String {
    fn from(addr: ServerAddress) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for ServerAddress {
    type Error = std::net::AddrParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for ServerAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Self::new)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
