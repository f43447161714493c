use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "WC" (0x57 0x43).
pub const MAGIC: [u8; 2] = [0x57, 0x43];

/// Default maximum message size: 4 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 4 * 1024 * 1024;

/// Encode one message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────────┐
/// │ Magic (2B)   │ Length    │ Message           │
/// │ 0x57 0x43    │ (4B LE)   │ (Length bytes)    │
/// │ "WC"         │           │                   │
/// └──────────────┴───────────┴──────────────────┘
/// ```
pub fn encode_message(message: &[u8], max_message: usize, dst: &mut BytesMut) -> Result<()> {
    if message.len() > max_message {
        return Err(TransportError::MessageTooLarge {
            size: message.len(),
            max: max_message,
        });
    }
    dst.reserve(HEADER_SIZE + message.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(message.len() as u32);
    dst.put_slice(message);
    Ok(())
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message
/// yet. On success, consumes the frame bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_message: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if src[0..2] != MAGIC {
        return Err(TransportError::InvalidMagic);
    }

    let message_len = u32::from_le_bytes(src[2..6].try_into().expect("slice length is 4")) as usize;
    if message_len > max_message {
        return Err(TransportError::MessageTooLarge {
            size: message_len,
            max: max_message,
        });
    }

    let total = HEADER_SIZE + message_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(message_len).freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let message = br#"{"kind":"call","cmd":"echo"}"#;

        encode_message(message, DEFAULT_MAX_MESSAGE, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + message.len());

        let decoded = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.as_ref(), message);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_header_needs_more_data() {
        let mut buf = BytesMut::from(&MAGIC[..]);
        assert!(decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn decode_incomplete_body_needs_more_data() {
        let mut buf = BytesMut::new();
        encode_message(b"hello", DEFAULT_MAX_MESSAGE, &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn decode_invalid_magic_fails() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00][..]);
        assert!(matches!(
            decode_message(&mut buf, DEFAULT_MAX_MESSAGE),
            Err(TransportError::InvalidMagic)
        ));
    }

    #[test]
    fn decode_oversized_message_fails() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(8 * 1024 * 1024);

        assert!(matches!(
            decode_message(&mut buf, DEFAULT_MAX_MESSAGE),
            Err(TransportError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn encode_oversized_message_fails() {
        let mut buf = BytesMut::new();
        let message = vec![0u8; 64];
        assert!(matches!(
            encode_message(&message, 32, &mut buf),
            Err(TransportError::MessageTooLarge { size: 64, max: 32 })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_consumes_messages_in_order() {
        let mut buf = BytesMut::new();
        encode_message(b"first", DEFAULT_MAX_MESSAGE, &mut buf).unwrap();
        encode_message(b"second", DEFAULT_MAX_MESSAGE, &mut buf).unwrap();

        let first = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();
        let second = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();

        assert_eq!(first.as_ref(), b"first");
        assert_eq!(second.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_message_roundtrips() {
        let mut buf = BytesMut::new();
        encode_message(b"", DEFAULT_MAX_MESSAGE, &mut buf).unwrap();
        let decoded = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();
        assert!(decoded.is_empty());
    }
}
