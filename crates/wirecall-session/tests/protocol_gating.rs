//! Dispatch gating observed from the raw wire side: validation,
//! unknown commands, duplicate suppression, and malformed input.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio::time::{sleep, timeout};
use wirecall_envelope::{decode, encode, Call, Envelope};
use wirecall_session::{
    CommandRegistry, Connection, ConnectionRole, Diagnostic, DiagnosticKind, DiagnosticSink,
    Fault, PendingCalls,
};
use wirecall_shape::Shape;
use wirecall_transport::{memory_pair, MessageStream};

/// Sink that records every diagnostic for later assertions.
#[derive(Default)]
struct RecordingSink(Mutex<Vec<Diagnostic>>);

impl RecordingSink {
    fn kinds(&self) -> Vec<DiagnosticKind> {
        self.0
            .lock()
            .expect("sink lock")
            .iter()
            .map(|diagnostic| diagnostic.kind)
            .collect()
    }

    fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.kinds().iter().filter(|seen| **seen == kind).count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.0.lock().expect("sink lock").push(diagnostic);
    }
}

fn text_shape() -> Shape {
    Shape::parse(r#"{"type":"object","properties":{"text":{"type":"string"}},"required":["text"]}"#)
        .expect("shape should compile")
}

/// A connection under test plus the raw peer side of its transport.
fn connection_and_raw_wire(
    commands: CommandRegistry,
) -> (Connection, MessageStream, Arc<RecordingSink>) {
    let (left, right) = memory_pair();
    let sink = Arc::new(RecordingSink::default());
    let connection = Connection::attach(left, ConnectionRole::Acceptor, commands, sink.clone());
    (connection, right, sink)
}

fn raw_call(cmd: &str, id: &str, payload: serde_json::Value) -> Bytes {
    encode(&Envelope::Call(Call::new(cmd, id, payload))).expect("call should encode")
}

async fn recv_reply(wire: &mut MessageStream) -> Envelope {
    let raw = timeout(Duration::from_secs(2), wire.recv())
        .await
        .expect("peer should reply in time")
        .expect("stream should stay open")
        .expect("message should arrive");
    decode(&raw).expect("reply should decode")
}

async fn assert_silent(wire: &mut MessageStream) {
    let verdict = timeout(Duration::from_millis(200), wire.recv()).await;
    assert!(verdict.is_err(), "expected no reply, got {verdict:?}");
}

#[tokio::test]
async fn conforming_call_is_answered() {
    let commands = CommandRegistry::new();
    commands.register("echo", text_shape(), |request, _connection| async move {
        Ok(request.payload().clone())
    });
    let (_connection, mut wire, _sink) = connection_and_raw_wire(commands);

    wire.send(raw_call("echo", "r-1", json!({"text": "hi"})))
        .await
        .expect("send should succeed");

    match recv_reply(&mut wire).await {
        Envelope::Reply(reply) => {
            assert_eq!(reply.request.meta.id, "r-1");
            assert_eq!(reply.response.meta.id, "r-1");
            assert_eq!(reply.response.payload, Some(json!({"text": "hi"})));
        }
        Envelope::Call(_) => panic!("expected a reply"),
    }
}

#[tokio::test]
async fn non_conforming_payload_never_reaches_the_handler() {
    let invoked = Arc::new(Mutex::new(false));
    let commands = CommandRegistry::new();
    let witness = invoked.clone();
    commands.register("echo", text_shape(), move |_request, _connection| {
        *witness.lock().expect("witness lock") = true;
        async move { Ok(json!({})) }
    });
    let (_connection, mut wire, sink) = connection_and_raw_wire(commands);

    wire.send(raw_call("echo", "r-2", json!({"text": 7})))
        .await
        .expect("send should succeed");

    assert_silent(&mut wire).await;
    assert!(!*invoked.lock().expect("witness lock"), "handler ran on invalid payload");
    assert_eq!(sink.count_of(DiagnosticKind::Validation), 1);
}

#[tokio::test]
async fn unknown_command_is_reported_and_dropped() {
    let (_connection, mut wire, sink) = connection_and_raw_wire(CommandRegistry::new());

    wire.send(raw_call("missing", "r-3", json!({})))
        .await
        .expect("send should succeed");

    assert_silent(&mut wire).await;
    assert_eq!(sink.count_of(DiagnosticKind::UnknownCommand), 1);
}

#[tokio::test]
async fn unknown_command_leaves_the_caller_pending() {
    // The documented gap: no error reply exists for unknown commands, so
    // the caller's handle must simply never resolve.
    let (left, right) = memory_pair();
    let caller = Connection::attach(
        left,
        ConnectionRole::Initiator,
        CommandRegistry::new(),
        Arc::new(RecordingSink::default()),
    );
    let peer_sink = Arc::new(RecordingSink::default());
    let _peer = Connection::attach(
        right,
        ConnectionRole::Acceptor,
        CommandRegistry::new(),
        peer_sink.clone(),
    );

    let handle = caller
        .invoke("missing", json!({}))
        .await
        .expect("invoke should queue");

    let unresolved = timeout(Duration::from_millis(300), handle.wait()).await;
    assert!(unresolved.is_err(), "handle must stay pending forever");
    assert_eq!(peer_sink.count_of(DiagnosticKind::UnknownCommand), 1);
    assert_eq!(caller.pending_calls(), 1);
}

#[tokio::test]
async fn duplicate_request_id_dispatches_exactly_once() {
    let invocations = Arc::new(Mutex::new(0usize));
    let commands = CommandRegistry::new();
    let counter = invocations.clone();
    commands.register("slow", Shape::anything(), move |_request, _connection| {
        *counter.lock().expect("counter lock") += 1;
        async move {
            sleep(Duration::from_millis(250)).await;
            Ok(json!({"done": true}))
        }
    });
    let (_connection, mut wire, sink) = connection_and_raw_wire(commands);

    // Two concurrent calls sharing one correlation id.
    wire.send(raw_call("slow", "dup-1", json!({})))
        .await
        .expect("send should succeed");
    wire.send(raw_call("slow", "dup-1", json!({})))
        .await
        .expect("send should succeed");

    // Exactly one reply comes back for the pair.
    match recv_reply(&mut wire).await {
        Envelope::Reply(reply) => assert_eq!(reply.response.meta.id, "dup-1"),
        Envelope::Call(_) => panic!("expected a reply"),
    }
    assert_silent(&mut wire).await;

    assert_eq!(*invocations.lock().expect("counter lock"), 1);
    assert_eq!(sink.count_of(DiagnosticKind::DuplicateRequest), 1);
}

#[tokio::test]
async fn request_id_is_reusable_after_completion() {
    let commands = CommandRegistry::new();
    commands.register("echo", Shape::anything(), |request, _connection| async move {
        Ok(request.payload().clone())
    });
    let (_connection, mut wire, sink) = connection_and_raw_wire(commands);

    wire.send(raw_call("echo", "again", json!({"round": 1})))
        .await
        .expect("send should succeed");
    match recv_reply(&mut wire).await {
        Envelope::Reply(reply) => assert_eq!(reply.response.payload, Some(json!({"round": 1}))),
        Envelope::Call(_) => panic!("expected a reply"),
    }

    // The first call completed, so the same id is a fresh logical call.
    wire.send(raw_call("echo", "again", json!({"round": 2})))
        .await
        .expect("send should succeed");
    match recv_reply(&mut wire).await {
        Envelope::Reply(reply) => assert_eq!(reply.response.payload, Some(json!({"round": 2}))),
        Envelope::Call(_) => panic!("expected a reply"),
    }

    assert_eq!(sink.count_of(DiagnosticKind::DuplicateRequest), 0);
}

#[tokio::test]
async fn malformed_message_is_dropped_and_the_loop_continues() {
    let commands = CommandRegistry::new();
    commands.register("echo", Shape::anything(), |request, _connection| async move {
        Ok(request.payload().clone())
    });
    let (_connection, mut wire, sink) = connection_and_raw_wire(commands);

    wire.send(Bytes::from_static(b"this is not an envelope"))
        .await
        .expect("send should succeed");
    // Untagged but otherwise call-shaped: still a decode failure.
    wire.send(Bytes::from_static(
        br#"{"cmd":"echo","meta":{"id":"x","timestamp":1},"payload":{}}"#,
    ))
    .await
    .expect("send should succeed");

    // The connection survives both and keeps dispatching.
    wire.send(raw_call("echo", "after-garbage", json!({"ok": true})))
        .await
        .expect("send should succeed");
    match recv_reply(&mut wire).await {
        Envelope::Reply(reply) => assert_eq!(reply.response.payload, Some(json!({"ok": true}))),
        Envelope::Call(_) => panic!("expected a reply"),
    }

    assert_eq!(sink.count_of(DiagnosticKind::Decode), 2);
}

#[tokio::test]
async fn stray_reply_is_silently_ignored() {
    let commands = CommandRegistry::new();
    commands.register("echo", Shape::anything(), |request, _connection| async move {
        Ok(request.payload().clone())
    });
    let (_connection, mut wire, sink) = connection_and_raw_wire(commands);

    // A reply nobody is waiting for: not an error, just dropped.
    let call = Call::new("echo", "nobody-waiting", json!({}));
    let stray = wirecall_envelope::Reply::ok((&call).into(), json!({"late": true}));
    wire.send(encode(&Envelope::Reply(stray)).expect("reply should encode"))
        .await
        .expect("send should succeed");

    wire.send(raw_call("echo", "still-alive", json!({})))
        .await
        .expect("send should succeed");
    match recv_reply(&mut wire).await {
        Envelope::Reply(reply) => assert_eq!(reply.response.meta.id, "still-alive"),
        Envelope::Call(_) => panic!("expected a reply"),
    }

    assert!(sink.kinds().is_empty(), "stray reply must not be reported");
}

#[tokio::test]
async fn reserved_ids_stay_distinct_under_concurrency() {
    let pending = Arc::new(PendingCalls::new());
    let mut workers = Vec::new();
    for _ in 0..8 {
        let pending = pending.clone();
        workers.push(tokio::spawn(async move {
            (0..125).map(|_| pending.reserve()).collect::<Vec<_>>()
        }));
    }

    let mut seen = std::collections::HashSet::new();
    for worker in workers {
        for id in worker.await.expect("worker should finish") {
            assert!(seen.insert(id), "collision among concurrently reserved ids");
        }
    }
    assert_eq!(seen.len(), 1000);
    assert_eq!(pending.len(), 1000);
}

#[tokio::test]
async fn handler_fault_still_clears_the_in_flight_id() {
    let commands = CommandRegistry::new();
    commands.register("fail", Shape::anything(), |_request, _connection| async move {
        Err::<serde_json::Value, _>(Fault::new(418, "teapot").passthrough())
    });
    let (_connection, mut wire, sink) = connection_and_raw_wire(commands);

    wire.send(raw_call("fail", "f-1", json!({})))
        .await
        .expect("send should succeed");
    match recv_reply(&mut wire).await {
        Envelope::Reply(reply) => {
            let error = reply.response.error.expect("fault becomes an error reply");
            assert_eq!(error.code, 418);
        }
        Envelope::Call(_) => panic!("expected a reply"),
    }

    // Same id again: the previous attempt completed, so this is fresh,
    // not a duplicate.
    wire.send(raw_call("fail", "f-1", json!({})))
        .await
        .expect("send should succeed");
    match recv_reply(&mut wire).await {
        Envelope::Reply(reply) => assert!(reply.response.error.is_some()),
        Envelope::Call(_) => panic!("expected a reply"),
    }

    assert_eq!(sink.count_of(DiagnosticKind::Handler), 2);
    assert_eq!(sink.count_of(DiagnosticKind::DuplicateRequest), 0);
}
