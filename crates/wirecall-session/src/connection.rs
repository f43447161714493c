use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::trace;
use uuid::Uuid;
use wirecall_envelope::{decode, encode, Call, CallEcho, Envelope, Reply};
use wirecall_transport::MessageStream;

use crate::command::{CommandRegistry, Request};
use crate::diagnostics::{Diagnostic, DiagnosticKind, SharedSink};
use crate::error::{CallError, Result, SessionError};
use crate::pending::{CallHandle, PendingCalls};

/// How many encoded messages may queue for the transport writer before
/// senders wait. A transport-write buffer, not a protocol limit: the
/// number of pending calls is unbounded by design.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Which side of the transport this connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Dialed out to a listening endpoint.
    Initiator,
    /// Accepted and admitted by a listening endpoint.
    Acceptor,
}

/// Connection lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// One live session over a duplex transport.
///
/// A connection owns its transport and pending-call table exclusively
/// and only *references* a command registry, which may be shared across
/// every connection of an endpoint. Cloning a `Connection` clones the
/// handle, not the session.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

struct Shared {
    id: String,
    remote_address: String,
    role: ConnectionRole,
    commands: CommandRegistry,
    pending: PendingCalls,
    /// Correlation ids of inbound calls whose handlers are running.
    in_flight_inbound: Mutex<HashSet<String>>,
    outbound: mpsc::Sender<Bytes>,
    state: watch::Sender<ConnectionState>,
    sink: SharedSink,
    shutdown: CancellationToken,
}

/// Teardown hook run once the driver finishes (endpoint eviction).
pub(crate) type CloseHook = Box<dyn FnOnce(&str) + Send>;

impl Connection {
    /// Attach a connection to an already-established message stream.
    pub fn attach(
        stream: MessageStream,
        role: ConnectionRole,
        commands: CommandRegistry,
        sink: SharedSink,
    ) -> Self {
        Self::spawn(Uuid::new_v4().to_string(), role, stream, commands, sink, None)
    }

    pub(crate) fn spawn(
        id: String,
        role: ConnectionRole,
        stream: MessageStream,
        commands: CommandRegistry,
        sink: SharedSink,
        on_close: Option<CloseHook>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (state_tx, _) = watch::channel(ConnectionState::Open);

        let shared = Arc::new(Shared {
            id,
            remote_address: stream.remote_address().to_string(),
            role,
            commands,
            pending: PendingCalls::new(),
            in_flight_inbound: Mutex::new(HashSet::new()),
            outbound: outbound_tx,
            state: state_tx,
            sink,
            shutdown: CancellationToken::new(),
        });

        let connection = Self { shared };
        tokio::spawn(drive(stream, outbound_rx, connection.clone(), on_close));
        connection
    }

    /// Endpoint-assigned connection identifier.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Remote address of the peer.
    pub fn remote_address(&self) -> &str {
        &self.shared.remote_address
    }

    pub fn role(&self) -> ConnectionRole {
        self.shared.role
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// The command registry this connection dispatches against.
    pub fn commands(&self) -> &CommandRegistry {
        &self.shared.commands
    }

    /// Number of outbound calls currently awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Invoke a command on the peer. The returned handle resolves when
    /// the matching reply arrives; without a deadline, a silent peer
    /// leaves it pending until the connection closes.
    pub async fn invoke(&self, cmd: &str, payload: Value) -> Result<CallHandle> {
        self.invoke_with_deadline(cmd, payload, None).await
    }

    /// Invoke with an optional deadline. On expiry the pending entry is
    /// removed and the handle resolves with [`CallError::TimedOut`].
    pub async fn invoke_with_deadline(
        &self,
        cmd: &str,
        payload: Value,
        deadline: Option<Duration>,
    ) -> Result<CallHandle> {
        if self.state() != ConnectionState::Open {
            return Err(SessionError::Closed);
        }

        let id = self.shared.pending.reserve();
        let call = Call::new(cmd, id.clone(), payload);
        let bytes = match encode(&Envelope::Call(call)) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.shared.pending.forget(&id);
                self.report(DiagnosticKind::Encode, err.to_string());
                return Err(err.into());
            }
        };

        let (completion_tx, completion_rx) = oneshot::channel();
        self.shared.pending.register(&id, completion_tx);

        if self.shared.outbound.send(bytes).await.is_err() {
            self.shared.pending.forget(&id);
            return Err(SessionError::Closed);
        }

        if let Some(deadline) = deadline {
            let connection = self.clone();
            let expiring = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                if connection
                    .shared
                    .pending
                    .fail(&expiring, CallError::TimedOut(deadline))
                {
                    trace!(id = %expiring, "call expired");
                }
            });
        }

        Ok(CallHandle::new(id, completion_rx))
    }

    /// Request the connection to close. Running handlers finish, but no
    /// new inbound calls are dispatched and teardown begins immediately.
    pub fn close(&self) {
        self.begin_closing();
        self.shared.shutdown.cancel();
    }

    /// Wait until teardown is complete and the state is `Closed`.
    pub async fn wait_closed(&self) {
        let mut state = self.shared.state.subscribe();
        while *state.borrow() != ConnectionState::Closed {
            if state.changed().await.is_err() {
                return;
            }
        }
    }

    fn begin_closing(&self) -> bool {
        self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Open {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        })
    }

    fn finish_close(&self) {
        self.shared.state.send_if_modified(|state| {
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Closed;
                true
            } else {
                false
            }
        });
    }

    fn report(&self, kind: DiagnosticKind, detail: impl Into<String>) {
        self.shared.sink.report(Diagnostic {
            kind,
            connection_id: Some(self.shared.id.clone()),
            detail: detail.into(),
        });
    }

    /// Route one raw inbound message. Never blocks the receive loop.
    fn dispatch(&self, raw: &[u8]) {
        let envelope = match decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.report(DiagnosticKind::Decode, err.to_string());
                return;
            }
        };

        match envelope {
            Envelope::Reply(reply) => {
                let outcome = match reply.response.outcome() {
                    Ok(payload) => Ok(payload.clone()),
                    Err(err) => Err(CallError::Remote {
                        code: err.code,
                        message: err.message,
                    }),
                };
                // Unknown ids are dropped: the caller may have given up.
                let _ = self.shared.pending.resolve(&reply.response.meta.id, outcome);
            }
            Envelope::Call(call) => self.dispatch_call(call),
        }
    }

    fn dispatch_call(&self, call: Call) {
        // A closing connection stops scheduling new handler dispatch.
        if self.state() != ConnectionState::Open {
            return;
        }

        let Some(command) = self.shared.commands.lookup(&call.cmd) else {
            self.report(
                DiagnosticKind::UnknownCommand,
                format!("no command registered as '{}'", call.cmd),
            );
            return;
        };

        if let Err(err) = command.shape().check(&call.payload) {
            self.report(
                DiagnosticKind::Validation,
                format!("payload for '{}' rejected: {err}", call.cmd),
            );
            return;
        }

        {
            let mut in_flight = lock_in_flight(&self.shared.in_flight_inbound);
            if !in_flight.insert(call.meta.id.clone()) {
                self.report(
                    DiagnosticKind::DuplicateRequest,
                    format!("request id '{}' is already being handled", call.meta.id),
                );
                return;
            }
        }

        // Handlers run in their own task so the receive loop keeps
        // routing; replies for distinct calls may leave out of order.
        let connection = self.clone();
        let handler = command.handler();
        tokio::spawn(async move {
            let request = Request::from(&call);
            let echo = CallEcho::from(&call);
            let request_id = call.meta.id.clone();

            let reply = match handler(request, connection.clone()).await {
                Ok(payload) => Reply::ok(echo, payload),
                Err(fault) => {
                    connection.report(
                        DiagnosticKind::Handler,
                        format!("handler for '{}' failed: {fault}", call.cmd),
                    );
                    Reply::err(echo, fault.to_wire())
                }
            };

            // The handler has completed: its id leaves the in-flight set
            // exactly once, whether the reply below makes it out or not.
            lock_in_flight(&connection.shared.in_flight_inbound).remove(&request_id);

            match encode(&Envelope::Reply(reply)) {
                Ok(bytes) => {
                    let _ = connection.shared.outbound.send(bytes).await;
                }
                Err(err) => connection.report(DiagnosticKind::Encode, err.to_string()),
            }
        });
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("remote_address", &self.shared.remote_address)
            .field("role", &self.shared.role)
            .field("state", &self.state())
            .finish()
    }
}

/// The driver task: sole owner of the transport. Routes inbound
/// messages, writes queued outbound messages, and tears the session
/// down when either side closes.
async fn drive(
    mut stream: MessageStream,
    mut outbound: mpsc::Receiver<Bytes>,
    connection: Connection,
    on_close: Option<CloseHook>,
) {
    let shutdown = connection.shared.shutdown.clone();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            queued = outbound.recv() => match queued {
                Some(bytes) => {
                    if let Err(err) = stream.send(bytes).await {
                        connection.report(DiagnosticKind::Transport, err.to_string());
                        break;
                    }
                }
                None => break,
            },

            inbound = stream.recv() => match inbound {
                Some(Ok(raw)) => connection.dispatch(&raw),
                Some(Err(err)) => {
                    // A framing error means the stream is desynchronized;
                    // closing is the only safe continuation.
                    connection.report(DiagnosticKind::Transport, err.to_string());
                    break;
                }
                None => {
                    trace!(id = %connection.id(), "peer closed");
                    break;
                }
            },
        }
    }

    connection.begin_closing();
    let _ = stream.close().await;
    connection.shared.pending.fail_all(CallError::Closed);
    // Eviction runs strictly after the Closed transition so an endpoint
    // admitting this connection concurrently can detect the race.
    connection.finish_close();
    if let Some(evict) = on_close {
        evict(connection.id());
    }
    trace!(id = %connection.id(), "connection closed");
}

fn lock_in_flight(set: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
