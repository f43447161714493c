use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

/// What went wrong, for routing inside a diagnostic sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Inbound message failed envelope decoding.
    Decode,
    /// Outbound message could not be encoded.
    Encode,
    /// Inbound call payload failed shape validation.
    Validation,
    /// Inbound call named a command nobody registered.
    UnknownCommand,
    /// Inbound call reused a correlation id already being handled.
    DuplicateRequest,
    /// A command handler returned a fault.
    Handler,
    /// The authorization hook rejected a pending transport.
    AuthorizationDenied,
    /// The transport failed mid-session.
    Transport,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::Validation => "validation",
            Self::UnknownCommand => "unknown_command",
            Self::DuplicateRequest => "duplicate_request",
            Self::Handler => "handler",
            Self::AuthorizationDenied => "authorization_denied",
            Self::Transport => "transport",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported protocol event.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Connection the event occurred on, when one exists yet.
    pub connection_id: Option<String>,
    pub detail: String,
}

/// Receives protocol diagnostics, fire-and-forget.
///
/// Implementations must never block: the receive loop reports inline.
/// One sink instance is injected per endpoint or connection at
/// construction and lives exactly as long as its owner.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Shared handle to a diagnostic sink.
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// Default sink: forwards diagnostics onto `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        let connection = diagnostic.connection_id.as_deref().unwrap_or("-");
        match diagnostic.kind {
            DiagnosticKind::Decode
            | DiagnosticKind::Encode
            | DiagnosticKind::Transport
            | DiagnosticKind::Handler
            | DiagnosticKind::AuthorizationDenied => {
                warn!(kind = %diagnostic.kind, connection, detail = %diagnostic.detail, "protocol diagnostic");
            }
            DiagnosticKind::Validation
            | DiagnosticKind::UnknownCommand
            | DiagnosticKind::DuplicateRequest => {
                debug!(kind = %diagnostic.kind, connection, detail = %diagnostic.detail, "protocol diagnostic");
            }
        }
    }
}
