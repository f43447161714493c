use std::fmt;

use wirecall_envelope::WireError;

/// Status code used for faults that are not marked pass-through.
pub const OPAQUE_STATUS: i64 = 500;

/// Message used for faults that are not marked pass-through.
pub const OPAQUE_MESSAGE: &str = "internal error";

/// An error a command handler returns instead of a payload.
///
/// By default a fault is opaque: the remote peer sees status 500 and
/// "internal error", never the real detail. A handler that wants the
/// caller to see the actual status and message marks the fault with
/// [`passthrough`](Fault::passthrough).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    status: i64,
    message: String,
    passthrough: bool,
}

impl Fault {
    /// Create a fault with an explicit status code and message.
    pub fn new(status: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            passthrough: false,
        }
    }

    /// Create an internal fault; always rendered opaquely to the peer.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(OPAQUE_STATUS, message)
    }

    /// Expose the real status and message to the remote peer.
    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    pub fn status(&self) -> i64 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// The error as the remote peer is allowed to see it.
    pub fn to_wire(&self) -> WireError {
        if self.passthrough {
            WireError {
                code: self.status,
                message: self.message.clone(),
            }
        } else {
            WireError {
                code: OPAQUE_STATUS,
                message: OPAQUE_MESSAGE.to_string(),
            }
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.status, self.message)
    }
}

impl std::error::Error for Fault {}
