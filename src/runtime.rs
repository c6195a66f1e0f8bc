//! Router runtime: the single-threaded event loop tying the transport,
//! codec, and heartbeat scheduler together.
//!
//! The loop multiplexes two readiness sources through one `mio::Poll`
//! wait: the raw socket becoming readable, and the heartbeat timer's
//! waker. On inbound data it reads, strips the IP header, decodes, and
//! logs the header with its source. On a due heartbeat it encodes an
//! `ECHO_REQUEST` and sends it to the configured peer. Transient failures
//! (read, decode, send) are logged and the loop continues; only the
//! externally-set shutdown flag terminates it.
//!
//! All I/O and codec work happens on the loop thread. The timer thread
//! touches nothing but the pending flag and the waker, so the sequence
//! counter and socket need no synchronization.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::{Events, Interest, Poll, Token, Waker};
use thiserror::Error;

use crate::heartbeat::HeartbeatScheduler;
use crate::net::{Endpoint, OpenError, RawSocket, ipv4_payload, LLRPC_PROTOCOL};
use crate::protocol::{EndpointId, HeaderCodec, MessageType, decode};
use crate::trace::{debug, error, info, warn};

/// Poll token for the raw socket.
const SOCKET: Token = Token(0);
/// Poll token for the heartbeat waker.
const WAKER: Token = Token(1);

/// Upper bound on the poll wait.
///
/// A missed wakeup or a pending shutdown is noticed within this bound;
/// it is short relative to any sensible heartbeat interval.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum raw IP datagram size we'll receive.
const MAX_DATAGRAM_SIZE: usize = 65535;

/// Configuration for the router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Local address to bind the raw socket to.
    pub bind_addr: Endpoint,
    /// Peer the heartbeat is sent to.
    pub peer: Endpoint,
    /// Fixed heartbeat tick interval.
    pub heartbeat_interval: Duration,
    /// Identifier stamped into outbound headers. Zero today; reserved
    /// for multi-endpoint deployments.
    pub endpoint: EndpointId,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind_addr: Endpoint::localhost(),
            peer: Endpoint::localhost(),
            heartbeat_interval: Duration::from_secs(1),
            endpoint: EndpointId::ZERO,
        }
    }
}

/// Error opening the router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The raw transport could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),
    /// Poll or waker setup failed.
    #[error("event loop setup failed: {0}")]
    Io(#[from] io::Error),
}

/// The LLRPC endpoint runtime.
///
/// Opened exactly once at process start; [`run`](Self::run) drives the
/// loop on the calling thread until the shutdown flag is set, then closes
/// the endpoint.
pub struct Router {
    socket: RawSocket,
    poll: Poll,
    events: Events,
    codec: HeaderCodec,
    scheduler: HeartbeatScheduler,
    peer: Endpoint,
    endpoint: EndpointId,
    shutdown: Arc<AtomicBool>,
    recv_buf: Vec<u8>,
}

impl Router {
    /// Opens the raw transport and arms the heartbeat timer.
    ///
    /// # Errors
    ///
    /// Returns an error if the raw socket cannot be created or bound, or
    /// if poll registration fails. All are fatal; the caller reports them
    /// and exits.
    pub fn open(config: RouterConfig) -> Result<Self, RouterError> {
        info!(
            bind_addr = %config.bind_addr,
            peer = %config.peer,
            interval_ms = config.heartbeat_interval.as_millis() as u64,
            "router starting"
        );

        let mut socket = RawSocket::open(LLRPC_PROTOCOL, config.bind_addr).map_err(|e| {
            error!(bind_addr = %config.bind_addr, error = %e, "failed to open raw socket");
            e
        })?;
        if let Ok(size) = socket.recv_buffer_size() {
            debug!(recv_buffer = size, "raw socket opened");
        }

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut socket, SOCKET, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let scheduler = HeartbeatScheduler::start(config.heartbeat_interval, waker);

        Ok(Self {
            socket,
            poll,
            events: Events::with_capacity(16),
            codec: HeaderCodec::new(),
            scheduler,
            peer: config.peer,
            endpoint: config.endpoint,
            shutdown: Arc::new(AtomicBool::new(false)),
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    /// Returns a clone of the shutdown flag for external signal handling.
    ///
    /// Storing `true` makes [`run`](Self::run) exit at the top of its
    /// next iteration; in-flight sends and receives complete naturally.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Runs the event loop until the shutdown flag is set, then closes
    /// the endpoint.
    pub fn run(mut self) {
        info!("event loop running");

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                // A signal interrupting the wait is not an error; retry.
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "poll failed");
                    continue;
                }
            }

            let mut readable = false;
            for event in &self.events {
                // The waker event carries no payload; the flag check
                // below covers it.
                if event.token() == SOCKET {
                    readable = true;
                }
            }

            if readable {
                self.drain_inbound();
            }

            // The swap inside take() clears the flag before we act, so a
            // tick racing the clear re-arms rather than getting lost.
            if self.scheduler.take() {
                self.send_heartbeat();
            }
        }

        info!("shutdown observed, closing endpoint");
        self.scheduler.stop();
        // The raw socket is released when `self` drops here.
    }

    /// Receives datagrams until the socket would block, logging each
    /// decoded header.
    fn drain_inbound(&mut self) {
        loop {
            match self.socket.try_recv_from(&mut self.recv_buf) {
                Ok(Some((len, from))) => self.report_datagram(len, &from),
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "RX: receive failed");
                    return;
                }
            }
        }
    }

    /// Decodes one received datagram and hands the header to the log.
    fn report_datagram(&self, len: usize, _from: &Endpoint) {
        // Raw sockets deliver the IP header with the payload.
        let Some(payload) = ipv4_payload(&self.recv_buf[..len]) else {
            warn!(from = %_from, len, "RX: malformed IP datagram");
            return;
        };

        match decode(payload) {
            Ok(_header) => {
                info!(
                    from = %_from,
                    kind = ?_header.kind,
                    endpoint = %_header.endpoint,
                    seq = _header.sequence,
                    len = _header.length,
                    timestamp = _header.timestamp,
                    checksum = _header.checksum,
                    "RX: message"
                );
            }
            Err(_e) => {
                warn!(from = %_from, error = %_e, "RX: undecodable message");
            }
        }
    }

    /// Encodes and sends one `ECHO_REQUEST` to the configured peer.
    ///
    /// The sequence counter advances whether or not the send succeeds.
    fn send_heartbeat(&mut self) {
        let (_header, bytes) = self.codec.encode(MessageType::EchoRequest, self.endpoint);

        match self.socket.try_send_to(&bytes, self.peer) {
            Ok(Some(_sent)) => {
                info!(
                    peer = %self.peer,
                    seq = _header.sequence,
                    timestamp = _header.timestamp,
                    "TX: echo request"
                );
            }
            Ok(None) => {
                warn!(peer = %self.peer, seq = _header.sequence, "TX: socket not writable, heartbeat dropped");
            }
            Err(_e) => {
                warn!(peer = %self.peer, seq = _header.sequence, error = %_e, "TX: send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_loopback() {
        let config = RouterConfig::default();
        assert_eq!(config.bind_addr, Endpoint::localhost());
        assert_eq!(config.peer, Endpoint::localhost());
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.endpoint, EndpointId::ZERO);
    }
}
