use bytes::Bytes;

use crate::error::{EnvelopeError, Result};
use crate::message::Envelope;

/// Encode an envelope into its wire representation.
///
/// On failure no bytes are produced and nothing may be sent.
pub fn encode(envelope: &Envelope) -> Result<Bytes> {
    let raw = serde_json::to_vec(envelope).map_err(EnvelopeError::Encode)?;
    Ok(Bytes::from(raw))
}

/// Decode raw bytes into a classified envelope.
///
/// Anything that fails here must be dropped by the caller, never
/// forwarded to dispatch: an untagged or unknown-kind message, a Call
/// with a missing or empty `cmd` or without `meta`/`payload`, or a Reply
/// whose response does not carry exactly one of `payload`/`error`.
pub fn decode(raw: &[u8]) -> Result<Envelope> {
    let envelope: Envelope = serde_json::from_slice(raw).map_err(EnvelopeError::Decode)?;

    match &envelope {
        Envelope::Call(call) => {
            if call.cmd.is_empty() {
                return Err(EnvelopeError::EmptyCommand);
            }
        }
        Envelope::Reply(reply) => {
            match (&reply.response.payload, &reply.response.error) {
                (Some(_), Some(_)) => return Err(EnvelopeError::AmbiguousResponse("both")),
                (None, None) => return Err(EnvelopeError::AmbiguousResponse("neither")),
                _ => {}
            }
        }
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::message::{Call, CallEcho, Reply, WireError};

    #[test]
    fn call_roundtrip_preserves_fields() {
        let call = Call::new("echo", "c-1", json!({"text": "hi"}));
        let raw = encode(&Envelope::Call(call.clone())).expect("call should encode");

        match decode(&raw).expect("call should decode") {
            Envelope::Call(decoded) => {
                assert_eq!(decoded.cmd, call.cmd);
                assert_eq!(decoded.meta, call.meta);
                assert_eq!(decoded.payload, call.payload);
            }
            Envelope::Reply(_) => panic!("decoded as reply"),
        }
    }

    #[test]
    fn ok_reply_roundtrip_preserves_fields() {
        let call = Call::new("echo", "c-2", json!({"text": "hi"}));
        let reply = Reply::ok(CallEcho::from(&call), json!({"text": "hi"}));
        let raw = encode(&Envelope::Reply(reply.clone())).expect("reply should encode");

        match decode(&raw).expect("reply should decode") {
            Envelope::Reply(decoded) => {
                assert_eq!(decoded.response.meta, reply.response.meta);
                assert_eq!(decoded.response.payload, reply.response.payload);
                assert_eq!(decoded.response.error, None);
            }
            Envelope::Call(_) => panic!("decoded as call"),
        }
    }

    #[test]
    fn error_reply_roundtrip_preserves_fields() {
        let call = Call::new("echo", "c-3", json!({}));
        let reply = Reply::err(
            CallEcho::from(&call),
            WireError {
                code: 403,
                message: "denied".to_string(),
            },
        );
        let raw = encode(&Envelope::Reply(reply.clone())).expect("reply should encode");

        match decode(&raw).expect("reply should decode") {
            Envelope::Reply(decoded) => {
                assert_eq!(decoded.response.error, reply.response.error);
                assert_eq!(decoded.response.payload, None);
            }
            Envelope::Call(_) => panic!("decoded as call"),
        }
    }

    #[test]
    fn decode_rejects_untagged_message() {
        // Structurally a valid call, but the mandatory kind tag is absent.
        let raw = br#"{"cmd":"echo","meta":{"id":"x","timestamp":1},"payload":{}}"#;
        assert!(matches!(decode(raw), Err(EnvelopeError::Decode(_))));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let raw = br#"{"kind":"notify","cmd":"echo","meta":{"id":"x","timestamp":1},"payload":{}}"#;
        assert!(matches!(decode(raw), Err(EnvelopeError::Decode(_))));
    }

    #[test]
    fn decode_rejects_missing_meta() {
        let raw = br#"{"kind":"call","cmd":"echo","payload":{}}"#;
        assert!(matches!(decode(raw), Err(EnvelopeError::Decode(_))));
    }

    #[test]
    fn decode_rejects_missing_payload() {
        let raw = br#"{"kind":"call","cmd":"echo","meta":{"id":"x","timestamp":1}}"#;
        assert!(matches!(decode(raw), Err(EnvelopeError::Decode(_))));
    }

    #[test]
    fn decode_rejects_non_string_cmd() {
        let raw = br#"{"kind":"call","cmd":7,"meta":{"id":"x","timestamp":1},"payload":{}}"#;
        assert!(matches!(decode(raw), Err(EnvelopeError::Decode(_))));
    }

    #[test]
    fn decode_rejects_empty_cmd() {
        let raw = br#"{"kind":"call","cmd":"","meta":{"id":"x","timestamp":1},"payload":{}}"#;
        assert!(matches!(decode(raw), Err(EnvelopeError::EmptyCommand)));
    }

    #[test]
    fn decode_rejects_response_with_both_outcomes() {
        let raw = br#"{"kind":"reply","request":{"cmd":"echo","meta":{"id":"x","timestamp":1}},"response":{"meta":{"id":"x","timestamp":2},"payload":{},"error":{"code":1,"message":"m"}}}"#;
        assert!(matches!(
            decode(raw),
            Err(EnvelopeError::AmbiguousResponse("both"))
        ));
    }

    #[test]
    fn decode_rejects_response_with_no_outcome() {
        let raw = br#"{"kind":"reply","request":{"cmd":"echo","meta":{"id":"x","timestamp":1}},"response":{"meta":{"id":"x","timestamp":2}}}"#;
        assert!(matches!(
            decode(raw),
            Err(EnvelopeError::AmbiguousResponse("neither"))
        ));
    }

    #[test]
    fn decode_rejects_non_json() {
        assert!(matches!(
            decode(b"not-json"),
            Err(EnvelopeError::Decode(_))
        ));
    }
}
