//! Raw IPv4 socket bound to the LLRPC protocol number.
//!
//! Provides a thin wrapper around a nonblocking [`socket2::Socket`] with
//! ergonomic send/recv APIs and integration with mio's polling
//! infrastructure. The socket is opened with `SOCK_RAW`, so creating it
//! requires `CAP_NET_RAW` (or root) and inbound datagrams arrive with the
//! IP header still attached; see [`ipv4_payload`].

use std::io::{self, ErrorKind};
use std::mem::MaybeUninit;
use std::net::SocketAddrV4;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;

use super::Endpoint;

/// The dedicated IP protocol number LLRPC traffic runs on.
///
/// Sits in the unassigned range, outside well-known TCP/UDP.
pub const LLRPC_PROTOCOL: u8 = 0xFC;

/// Errors opening the raw transport.
///
/// Both variants are fatal: failing to create or bind a raw endpoint is an
/// operator-configuration error, not a transient condition, so callers
/// report it and exit rather than retry.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The raw channel could not be created (usually missing `CAP_NET_RAW`).
    #[error("unable to create LLRPC socket: {0}")]
    Create(#[source] io::Error),
    /// The socket could not be bound to the local address.
    #[error("unable to bind LLRPC socket: {0}")]
    Bind(#[source] io::Error),
}

/// A nonblocking raw IPv4 socket.
///
/// Use with mio's `Poll` for readiness notification; all I/O methods
/// return `WouldBlock` (or `None` via the `try_` variants) when the socket
/// is not ready. The underlying channel is released on drop.
pub struct RawSocket {
    inner: Socket,
}

impl RawSocket {
    /// Creates a raw socket for `protocol` bound to the given local address.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::Create`] if the socket cannot be created and
    /// [`OpenError::Bind`] if the bind fails, each carrying the underlying
    /// system error.
    pub fn open(protocol: u8, local: Endpoint) -> Result<Self, OpenError> {
        let inner = Socket::new(
            Domain::IPV4,
            Type::RAW,
            Some(Protocol::from(i32::from(protocol))),
        )
        .map_err(OpenError::Create)?;
        inner.set_nonblocking(true).map_err(OpenError::Create)?;

        // Raw sockets carry no port; the sockaddr port field must be zero.
        let addr = SockAddr::from(SocketAddrV4::new(local.ip(), 0));
        inner.bind(&addr).map_err(OpenError::Bind)?;

        Ok(Self { inner })
    }

    /// Returns the local address this socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<Endpoint> {
        let addr = self.inner.local_addr()?;
        Ok(addr
            .as_socket_ipv4()
            .map_or(Endpoint::any(), |sa| Endpoint::new(*sa.ip())))
    }

    /// Sends a datagram to the given endpoint.
    ///
    /// The kernel prepends the IP header; `buf` is the protocol payload
    /// only. Returns the number of payload bytes sent.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the socket would block.
    pub fn send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddrV4::new(dest.ip(), 0));
        self.inner.send_to(buf, &addr)
    }

    /// Receives a datagram from the socket.
    ///
    /// Returns the number of bytes received and the source endpoint. The
    /// received bytes include the IP header; strip it with
    /// [`ipv4_payload`] before decoding.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the socket would block.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Endpoint)> {
        // SAFETY: `&mut [u8]` is a valid view as `&mut [MaybeUninit<u8>]`,
        // and recv_from only writes initialized bytes into it.
        let uninit = unsafe { &mut *(std::ptr::from_mut::<[u8]>(buf) as *mut [MaybeUninit<u8>]) };
        let (len, addr) = self.inner.recv_from(uninit)?;
        // A raw IPv4 socket only ever reports IPv4 sources; fall back to
        // the wildcard rather than failing the read.
        let source = addr
            .as_socket_ipv4()
            .map_or(Endpoint::any(), |sa| Endpoint::new(*sa.ip()));
        Ok((len, source))
    }

    /// Attempts to send, returning `Ok(None)` instead of `WouldBlock`.
    ///
    /// Useful in polling loops where `WouldBlock` is expected.
    pub fn try_send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<Option<usize>> {
        match self.send_to(buf, dest) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempts to receive, returning `Ok(None)` instead of `WouldBlock`.
    ///
    /// Useful in polling loops where `WouldBlock` is expected.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, Endpoint)>> {
        match self.recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, from))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Gets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be retrieved.
    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        let fd = self.inner.as_fd();
        Ok(rustix::net::sockopt::socket_recv_buffer_size(fd)?)
    }

    /// Sets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        let fd = self.inner.as_fd();
        rustix::net::sockopt::set_socket_recv_buffer_size(fd, size)?;
        Ok(())
    }
}

impl AsFd for RawSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl Source for RawSocket {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).deregister(registry)
    }
}

/// Strips the IPv4 header from a datagram received on a raw socket.
///
/// The kernel delivers the full IP packet on `SOCK_RAW`; the protocol
/// payload starts after the variable-length header (IHL × 4 bytes).
/// Returns `None` for non-IPv4 packets, nonsense IHL values, or buffers
/// truncated before the header ends.
#[must_use]
pub fn ipv4_payload(datagram: &[u8]) -> Option<&[u8]> {
    let first = *datagram.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let header_len = usize::from(first & 0x0F) * 4;
    if header_len < 20 || datagram.len() < header_len {
        return None;
    }
    Some(&datagram[header_len..])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a minimal IPv4 header with the given IHL (in 32-bit words).
    fn ip_packet(ihl: u8, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; usize::from(ihl) * 4];
        packet[0] = 0x40 | ihl;
        packet.extend_from_slice(payload);
        packet
    }

    #[test]
    fn payload_after_minimal_header() {
        let packet = ip_packet(5, b"hello");
        assert_eq!(ipv4_payload(&packet), Some(&b"hello"[..]));
    }

    #[test]
    fn payload_after_header_with_options() {
        // IHL 6 = 24-byte header (one option word).
        let packet = ip_packet(6, b"payload");
        assert_eq!(ipv4_payload(&packet), Some(&b"payload"[..]));
    }

    #[test]
    fn empty_payload_is_valid() {
        let packet = ip_packet(5, b"");
        assert_eq!(ipv4_payload(&packet), Some(&b""[..]));
    }

    #[test]
    fn rejects_non_ipv4() {
        let mut packet = ip_packet(5, b"hello");
        packet[0] = 0x60 | 5; // version 6
        assert_eq!(ipv4_payload(&packet), None);
    }

    #[test]
    fn rejects_truncated_header() {
        let packet = ip_packet(5, b"");
        assert_eq!(ipv4_payload(&packet[..12]), None);
    }

    #[test]
    fn rejects_undersized_ihl() {
        // IHL 3 would place the payload inside the mandatory header.
        let packet = ip_packet(5, b"hello");
        let mut bad = packet.clone();
        bad[0] = 0x40 | 3;
        assert_eq!(ipv4_payload(&bad), None);
    }

    #[test]
    fn rejects_empty_buffer() {
        assert_eq!(ipv4_payload(&[]), None);
    }
}
