use std::time::Duration;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wirecall_transport::TransportError),

    /// Envelope encode/decode error.
    #[error("envelope error: {0}")]
    Envelope(#[from] wirecall_envelope::EnvelopeError),

    /// The connection is no longer open.
    #[error("connection closed")]
    Closed,

    /// The endpoint was started twice.
    #[error("endpoint already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// How an outbound call terminated without a success payload.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CallError {
    /// The peer answered with an error reply.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    /// The invoke deadline expired before a reply arrived.
    #[error("call timed out after {0:?}")]
    TimedOut(Duration),

    /// The connection closed before a reply arrived.
    #[error("connection closed before reply")]
    Closed,
}

/// What an outbound call ultimately resolves to.
pub type CallResult = std::result::Result<serde_json::Value, CallError>;
