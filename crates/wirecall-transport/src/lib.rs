//! Ordered, message-oriented duplex transports for wirecall.
//!
//! The session layer consumes a [`MessageStream`]: `send` a whole message,
//! `recv` a whole message, observe the close, read the remote address.
//! Framing is invisible above this crate. Two implementations:
//!
//! - Unix domain sockets with length-prefixed framing
//!   (2-byte magic `"WC"` + 4-byte little-endian payload length)
//! - an in-memory pair ([`memory_pair`]) for tests and same-process wiring

pub mod error;
pub mod framing;
#[cfg(unix)]
pub mod listener;
pub mod memory;
pub mod stream;

pub use error::{Result, TransportError};
pub use framing::{decode_message, encode_message, DEFAULT_MAX_MESSAGE, HEADER_SIZE, MAGIC};
#[cfg(unix)]
pub use listener::MessageListener;
pub use memory::memory_pair;
pub use stream::{MessageStream, PeerCredentials};
