use bytes::Bytes;
use tokio::sync::mpsc;

use crate::framing::DEFAULT_MAX_MESSAGE;
use crate::stream::MessageStream;

const MEMORY_CHANNEL_DEPTH: usize = 64;

/// Create a connected pair of in-memory message streams.
///
/// Everything sent on one side arrives, in order, on the other. Closing
/// either side surfaces as a clean end-of-stream (`recv` -> `None`) to
/// its peer. Intended for tests and same-process wiring.
pub fn memory_pair() -> (MessageStream, MessageStream) {
    let (a_tx, b_rx) = mpsc::channel(MEMORY_CHANNEL_DEPTH);
    let (b_tx, a_rx) = mpsc::channel(MEMORY_CHANNEL_DEPTH);

    let a = MessageStream::from_memory(
        a_tx,
        a_rx,
        "memory:peer-b".to_string(),
        DEFAULT_MAX_MESSAGE,
    );
    let b = MessageStream::from_memory(
        b_tx,
        b_rx,
        "memory:peer-a".to_string(),
        DEFAULT_MAX_MESSAGE,
    );

    (a, b)
}
