//! LLRPC: a link-level RPC endpoint running on a dedicated raw IP
//! protocol.
//!
//! The crate binds a raw IPv4 socket to protocol number
//! [`net::LLRPC_PROTOCOL`], sends a periodic header-only `ECHO_REQUEST`
//! heartbeat to a configured peer, and logs every inbound message on the
//! protocol. See [`runtime::Router`] for the event loop and
//! [`protocol`] for the 24-byte wire header.

pub mod heartbeat;
pub mod net;
pub mod protocol;
pub mod runtime;
pub mod trace;

pub use trace::init_tracing;
