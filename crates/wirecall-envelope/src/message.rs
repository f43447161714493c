use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation metadata carried by every Call and Reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Meta {
    /// Opaque correlation token pairing a Call with its Reply.
    pub id: String,
    /// Milliseconds since the Unix epoch at message construction.
    pub timestamp: i64,
}

impl Meta {
    /// Create metadata for the given correlation id with a fresh timestamp.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: now_millis(),
        }
    }
}

/// An outbound invocation of a named command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Call {
    /// Command name to invoke on the peer.
    pub cmd: String,
    pub meta: Meta,
    /// Shape-validated structured payload.
    pub payload: Value,
}

impl Call {
    /// Build a Call for `cmd` with a fresh timestamp.
    pub fn new(cmd: impl Into<String>, id: impl Into<String>, payload: Value) -> Self {
        Self {
            cmd: cmd.into(),
            meta: Meta::new(id),
            payload,
        }
    }
}

/// The identifying fields of the Call a Reply answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallEcho {
    pub cmd: String,
    pub meta: Meta,
}

impl From<&Call> for CallEcho {
    fn from(call: &Call) -> Self {
        Self {
            cmd: call.cmd.clone(),
            meta: call.meta.clone(),
        }
    }
}

/// A structured error surfaced to the remote peer in a Reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

/// The response body of a Reply: fresh metadata echoing the Call's id,
/// plus exactly one of `payload` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    /// The terminal outcome this response carries.
    ///
    /// Decoded responses always hold exactly one of payload/error; a
    /// hand-built response violating that reads as an internal error.
    pub fn outcome(&self) -> std::result::Result<&Value, WireError> {
        match (&self.payload, &self.error) {
            (Some(payload), None) => Ok(payload),
            (_, Some(error)) => Err(error.clone()),
            (None, None) => Err(WireError {
                code: 500,
                message: "reply carried no payload or error".to_string(),
            }),
        }
    }
}

/// The terminal response to a Call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    /// Echo of the originating Call's identifying fields.
    pub request: CallEcho,
    pub response: Response,
}

impl Reply {
    /// Build a success Reply: fresh timestamp, the originating Call's id.
    pub fn ok(request: CallEcho, payload: Value) -> Self {
        let meta = Meta::new(request.meta.id.clone());
        Self {
            request,
            response: Response {
                meta,
                payload: Some(payload),
                error: None,
            },
        }
    }

    /// Build an error Reply: fresh timestamp, the originating Call's id.
    pub fn err(request: CallEcho, error: WireError) -> Self {
        let meta = Meta::new(request.meta.id.clone());
        Self {
            request,
            response: Response {
                meta,
                payload: None,
                error: Some(error),
            },
        }
    }
}

/// A decoded wire message, discriminated by the mandatory `kind` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    Call(Call),
    Reply(Reply),
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
