//! The wirecall wire envelope: a tagged Call/Reply union and its codec.
//!
//! Every message on a wirecall connection is one of exactly two kinds:
//! - A [`Call`] — an outbound invocation of a named command, carrying a
//!   correlation id in its [`Meta`].
//! - A [`Reply`] — the terminal response to a Call, success or error,
//!   echoing the Call's correlation id.
//!
//! The kind is carried explicitly in a mandatory `kind` field rather than
//! inferred from which fields happen to be present, so malformed input
//! fails decoding instead of being misclassified.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{decode, encode};
pub use error::{EnvelopeError, Result};
pub use message::{Call, CallEcho, Envelope, Meta, Reply, Response, WireError};
