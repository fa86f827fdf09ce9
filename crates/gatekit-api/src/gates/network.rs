//! Network topology for the authentication gate's same-subnet bypass.
//!
//! A caller is trusted when its /24 (IPv4) or /64 (IPv6) block and one of
//! the service's local networks contain each other's address.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use axum::http::HeaderMap;

/// Prefix length of the block a bare IPv4 address stands for.
pub const IPV4_BLOCK_PREFIX: u8 = 24;
/// Prefix length of the block a bare IPv6 address stands for.
pub const IPV6_BLOCK_PREFIX: u8 = 64;

/// An address together with a prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    addr: IpAddr,
    prefix: u8,
}

impl Subnet {
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, SubnetParseError> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(SubnetParseError::Prefix(prefix));
        }
        Ok(Self { addr, prefix })
    }

    /// The /24 or /64 block around `addr`.
    pub fn block(addr: IpAddr) -> Self {
        let addr = addr.to_canonical();
        let prefix = match addr {
            IpAddr::V4(_) => IPV4_BLOCK_PREFIX,
            IpAddr::V6(_) => IPV6_BLOCK_PREFIX,
        };
        Self { addr, prefix }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `ip` lies inside this network. Families never mix.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }

    /// Symmetric overlap: either network contains the other's address.
    pub fn intersects(&self, other: &Subnet) -> bool {
        self.contains(other.addr) || other.contains(self.addr)
    }
}

fn mask_u32(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p.min(32))),
    }
}

fn mask_u128(prefix: u8) -> u128 {
    match prefix {
        0 => 0,
        p => u128::MAX << (128 - u32::from(p.min(128))),
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = SubnetParseError;

    /// `addr/prefix`, or a bare address meaning its /24 or /64 block.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr
                    .parse()
                    .map_err(|_| SubnetParseError::Address(addr.to_string()))?;
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| SubnetParseError::Address(s.to_string()))?;
                Self::new(addr.to_canonical(), prefix)
            }
            None => s
                .parse::<IpAddr>()
                .map(Self::block)
                .map_err(|_| SubnetParseError::Address(s.to_string())),
        }
    }
}

/// Errors parsing a CIDR string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubnetParseError {
    #[error("invalid network address {0:?}")]
    Address(String),
    #[error("prefix length {0} out of range")]
    Prefix(u8),
}

/// The service's own networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalNetworks(Vec<Subnet>);

impl LocalNetworks {
    /// Blocks of every non-loopback interface address. Loopback callers
    /// only bypass when listed explicitly with [`from_cidrs`](Self::from_cidrs).
    ///
    /// Interface enumeration failure yields no networks, which disables
    /// the bypass rather than failing startup.
    pub fn discover() -> Self {
        match get_if_addrs::get_if_addrs() {
            Ok(interfaces) => {
                let nets: Vec<Subnet> = interfaces
                    .iter()
                    .filter(|iface| !iface.is_loopback())
                    .map(|iface| Subnet::block(iface.ip()))
                    .collect();
                tracing::info!(
                    networks = %nets.iter().map(Subnet::to_string).collect::<Vec<_>>().join(","),
                    "discovered local networks"
                );
                Self(nets)
            }
            Err(e) => {
                tracing::warn!(error = %e, "interface discovery failed, topology bypass disabled");
                Self::default()
            }
        }
    }

    pub fn from_cidrs<S: AsRef<str>>(cidrs: &[S]) -> Result<Self, SubnetParseError> {
        cidrs
            .iter()
            .map(|c| c.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn networks(&self) -> &[Subnet] {
        &self.0
    }

    /// Whether a request arriving from `peer` may vouch for the caller
    /// with forwarding headers: the peer is loopback or local.
    pub fn trusts_proxy(&self, peer: IpAddr) -> bool {
        peer.to_canonical().is_loopback() || self.admits(peer)
    }

    /// Whether the caller's block overlaps any local network.
    pub fn admits(&self, caller: IpAddr) -> bool {
        let caller = Subnet::block(caller);
        self.0.iter().any(|net| net.intersects(&caller))
    }
}

/// Resolve the caller address.
///
/// With `trust_forwarded`, the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`; otherwise, or when neither parses, the transport peer.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_forwarded: bool,
) -> Option<IpAddr> {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }
        let real = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if real.is_some() {
            return real;
        }
    }
    peer
}
