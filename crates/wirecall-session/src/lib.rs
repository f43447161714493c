//! Bidirectional command-RPC sessions for wirecall.
//!
//! Either endpoint of a connection registers named commands (a payload
//! shape plus an async handler) and invokes commands on its peer,
//! awaiting a correlated reply. This crate is the protocol core:
//!
//! - [`CommandRegistry`] — name → (shape, handler), shared read-mostly
//!   across every connection of an endpoint
//! - [`PendingCalls`] / [`CallHandle`] — request/reply correlation for
//!   outbound calls, with optional per-call deadlines
//! - [`Connection`] — one session over a duplex transport: the receive
//!   loop, validation gating, duplicate-request suppression, and
//!   out-of-order handler dispatch
//! - [`Endpoint`] — the listening side, with an authorization gate that
//!   runs before a transport is ever admitted as a Connection
//! - [`connect`] — the initiating side of the same Connection type
//! - [`DiagnosticSink`] — injected, fire-and-forget protocol diagnostics

pub mod command;
pub mod connection;
#[cfg(unix)]
pub mod connector;
pub mod diagnostics;
#[cfg(unix)]
pub mod endpoint;
pub mod error;
pub mod fault;
pub mod pending;

pub use command::{Command, CommandRegistry, Handler, Request};
#[cfg(unix)]
pub use connector::{connect, connect_with_config};
pub use connection::{Connection, ConnectionRole, ConnectionState};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, SharedSink, TracingSink};
#[cfg(unix)]
pub use endpoint::{Admission, AuthorizationHandler, Endpoint};
pub use error::{CallError, CallResult, Result, SessionError};
pub use fault::{Fault, OPAQUE_MESSAGE, OPAQUE_STATUS};
pub use pending::{CallHandle, PendingCalls};
