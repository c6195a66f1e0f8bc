//! Loopback integration tests for the raw transport and the router loop.
//!
//! Raw sockets need `CAP_NET_RAW`, so every test opens the transport
//! first and skips (with a note on stderr) when the capability is
//! missing. Under the LLRPC protocol number every bound raw socket on the
//! host receives a copy of every datagram, so tests tag their traffic
//! with a distinct endpoint ID and filter on it to tolerate parallel
//! test runs.

use std::io::ErrorKind;
use std::thread;
use std::time::{Duration, Instant};

use llrpc::net::{ipv4_payload, Endpoint, OpenError, RawSocket, LLRPC_PROTOCOL};
use llrpc::protocol::{decode, EndpointId, HeaderCodec, MessageHeader, MessageType, HEADER_SIZE};
use llrpc::runtime::{Router, RouterConfig, RouterError};

/// Opens a loopback raw socket, or skips the test without privileges.
fn open_loopback() -> Option<RawSocket> {
    match RawSocket::open(LLRPC_PROTOCOL, Endpoint::localhost()) {
        Ok(socket) => Some(socket),
        Err(OpenError::Create(e)) if e.kind() == ErrorKind::PermissionDenied => {
            eprintln!("skipping: raw sockets require CAP_NET_RAW");
            None
        }
        Err(e) => panic!("unexpected open failure: {e}"),
    }
}

/// Opens a router on loopback, or skips the test without privileges.
fn open_router(config: RouterConfig) -> Option<Router> {
    match Router::open(config) {
        Ok(router) => Some(router),
        Err(RouterError::Open(OpenError::Create(ref e)))
            if e.kind() == ErrorKind::PermissionDenied =>
        {
            eprintln!("skipping: raw sockets require CAP_NET_RAW");
            None
        }
        Err(e) => panic!("unexpected open failure: {e}"),
    }
}

/// Receives until a decodable header matching `pred` arrives or the
/// timeout elapses.
fn recv_matching(
    socket: &RawSocket,
    timeout: Duration,
    pred: impl Fn(&MessageHeader) -> bool,
) -> Option<(MessageHeader, Endpoint)> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; 1500];

    while Instant::now() < deadline {
        match socket.try_recv_from(&mut buf) {
            Ok(Some((len, from))) => {
                if let Some(payload) = ipv4_payload(&buf[..len]) {
                    if let Ok(header) = decode(payload) {
                        if pred(&header) {
                            return Some((header, from));
                        }
                    }
                }
            }
            Ok(None) => thread::sleep(Duration::from_millis(1)),
            Err(_) => return None,
        }
    }
    None
}

#[test]
fn open_close_reopen_same_address() {
    let Some(socket) = open_loopback() else { return };
    assert_eq!(socket.local_addr().unwrap(), Endpoint::localhost());
    drop(socket);

    // The handle was released, so a second open of the same local
    // address succeeds.
    let socket = open_loopback().expect("reopen after close");
    assert_eq!(socket.local_addr().unwrap(), Endpoint::localhost());
}

#[test]
fn echo_request_roundtrip_over_loopback() {
    let Some(socket) = open_loopback() else { return };

    let tag = EndpointId::from(42);
    let mut codec = HeaderCodec::new();
    let (sent, bytes) = codec.encode(MessageType::EchoRequest, tag);
    let n = socket.send_to(&bytes, Endpoint::localhost()).unwrap();
    assert_eq!(n, HEADER_SIZE);

    let (received, from) = recv_matching(&socket, Duration::from_secs(2), |h| h.endpoint == tag)
        .expect("should receive our own datagram on loopback");

    assert_eq!(received, sent);
    assert_eq!(received.kind, MessageType::EchoRequest);
    assert_eq!(received.sequence, 1);
    assert_eq!(received.length, HEADER_SIZE as u16);
    assert_eq!(received.checksum, 0);
    assert_eq!(from, Endpoint::localhost());
}

#[test]
fn router_heartbeats_and_shuts_down() {
    let Some(observer) = open_loopback() else { return };

    let tag = EndpointId::from(3);
    let config = RouterConfig {
        heartbeat_interval: Duration::from_millis(50),
        endpoint: tag,
        ..RouterConfig::default()
    };
    let Some(router) = open_router(config) else { return };
    let shutdown = router.shutdown_flag();
    let handle = thread::spawn(move || router.run());

    let (header, _) = recv_matching(&observer, Duration::from_secs(2), |h| h.endpoint == tag)
        .expect("router should emit a heartbeat");
    assert_eq!(header.kind, MessageType::EchoRequest);
    assert!(header.sequence >= 1);
    assert_eq!(header.length, HEADER_SIZE as u16);

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    handle.join().expect("router loop should exit cleanly");
}

#[test]
fn router_survives_malformed_datagrams() {
    let Some(observer) = open_loopback() else { return };

    let tag = EndpointId::from(4);
    let config = RouterConfig {
        heartbeat_interval: Duration::from_millis(50),
        endpoint: tag,
        ..RouterConfig::default()
    };
    let Some(router) = open_router(config) else { return };
    let shutdown = router.shutdown_flag();
    let handle = thread::spawn(move || router.run());

    // Too short for a header and an unknown type: both are decode
    // errors the loop must absorb.
    observer
        .send_to(&[0x01, 0x02, 0x03], Endpoint::localhost())
        .unwrap();
    let mut unknown = [0u8; HEADER_SIZE];
    unknown[0..2].copy_from_slice(&99u16.to_be_bytes());
    observer.send_to(&unknown, Endpoint::localhost()).unwrap();

    // The loop keeps going: heartbeats continue after the bad input.
    let first = recv_matching(&observer, Duration::from_secs(2), |h| h.endpoint == tag)
        .expect("heartbeat before shutdown")
        .0;
    let second = recv_matching(&observer, Duration::from_secs(2), |h| {
        h.endpoint == tag && h.sequence > first.sequence
    })
    .expect("heartbeat after malformed traffic")
    .0;
    assert!(second.sequence > first.sequence);

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    handle.join().expect("router loop should exit cleanly");
}
