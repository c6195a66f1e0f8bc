//! Raw network transport primitives.
//!
//! LLRPC runs directly on a dedicated IP protocol number rather than
//! TCP/UDP, so the transport here is a raw IPv4 socket and addresses are
//! plain host addresses with no port component.

pub mod endpoint;
pub mod socket;

pub use endpoint::Endpoint;
pub use socket::{ipv4_payload, OpenError, RawSocket, LLRPC_PROTOCOL};
