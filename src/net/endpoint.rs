//! Network endpoint type.
//!
//! LLRPC addresses peers at the network layer, so an endpoint is an IPv4
//! host address with no port.

use std::net::{AddrParseError, Ipv4Addr};
use std::str::FromStr;

/// A raw-transport endpoint (IPv4 host address).
///
/// Wrapper around [`Ipv4Addr`] that keeps the crate's addressing explicit:
/// there is no port because the protocol number identifies the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(Ipv4Addr);

impl Endpoint {
    /// Creates a new endpoint from an IPv4 address.
    #[must_use]
    pub const fn new(addr: Ipv4Addr) -> Self {
        Self(addr)
    }

    /// Creates an endpoint from dotted-quad octets.
    #[must_use]
    pub const fn new_v4(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(Ipv4Addr::new(a, b, c, d))
    }

    /// The loopback endpoint (127.0.0.1).
    #[must_use]
    pub const fn localhost() -> Self {
        Self(Ipv4Addr::LOCALHOST)
    }

    /// The wildcard endpoint (0.0.0.0), binding all interfaces.
    #[must_use]
    pub const fn any() -> Self {
        Self(Ipv4Addr::UNSPECIFIED)
    }

    /// Returns the underlying address.
    #[must_use]
    pub const fn ip(&self) -> Ipv4Addr {
        self.0
    }
}

impl From<Ipv4Addr> for Endpoint {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for Ipv4Addr {
    fn from(ep: Endpoint) -> Self {
        ep.0
    }
}

impl FromStr for Endpoint {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>().map(Self)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
