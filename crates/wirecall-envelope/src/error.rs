/// Errors that can occur during envelope encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The message is not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope decoded but its command name is empty.
    #[error("envelope command name is empty")]
    EmptyCommand,

    /// A reply response must carry exactly one of `payload` or `error`.
    #[error("reply response carries {0} of payload/error (expected exactly one)")]
    AmbiguousResponse(&'static str),

    /// The payload could not be serialized to the wire representation.
    #[error("unencodable payload: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;
