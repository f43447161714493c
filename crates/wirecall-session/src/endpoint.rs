use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;
use wirecall_transport::{MessageListener, MessageStream, PeerCredentials};

use crate::command::CommandRegistry;
use crate::connection::{Connection, ConnectionRole, ConnectionState};
use crate::diagnostics::{Diagnostic, DiagnosticKind, SharedSink, TracingSink};
use crate::error::{Result, SessionError};
use crate::fault::Fault;

/// What the authorization hook sees: the raw pre-admission identity of a
/// transport that has connected but is not yet a Connection.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The connection id the transport will receive if admitted.
    pub connection_id: String,
    pub remote_address: String,
    /// Peer process credentials, where the platform exposes them.
    pub credentials: Option<PeerCredentials>,
}

type AuthFuture = Pin<Box<dyn Future<Output = std::result::Result<(), Fault>> + Send>>;

/// Asynchronous admission gate. Returning an error tears the pending
/// transport down before it is ever registered.
pub type AuthorizationHandler = Arc<dyn Fn(Admission) -> AuthFuture + Send + Sync>;

/// The listening side: accepts transports, gates admission, and owns the
/// registry of live connections plus the shared command registry.
pub struct Endpoint {
    listener: Mutex<Option<MessageListener>>,
    path: PathBuf,
    commands: CommandRegistry,
    connections: Arc<Mutex<HashMap<String, Connection>>>,
    authorizer: Arc<Mutex<Option<AuthorizationHandler>>>,
    sink: SharedSink,
    shutdown: CancellationToken,
}

impl Endpoint {
    /// Bind a listening endpoint on a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let listener = MessageListener::bind(path)?;
        let path = listener.path().to_path_buf();
        Ok(Self {
            listener: Mutex::new(Some(listener)),
            path,
            commands: CommandRegistry::new(),
            connections: Arc::new(Mutex::new(HashMap::new())),
            authorizer: Arc::new(Mutex::new(None)),
            sink: Arc::new(TracingSink),
            shutdown: CancellationToken::new(),
        })
    }

    /// Use an existing command registry instead of a fresh empty one.
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = commands;
        self
    }

    /// Override the diagnostic sink injected into every connection.
    pub fn with_diagnostics(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Install the admission gate. Without one, admission is immediate.
    pub fn set_authorization_handler<F, Fut>(&self, hook: F)
    where
        F: Fn(Admission) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), Fault>> + Send + 'static,
    {
        let handler: AuthorizationHandler =
            Arc::new(move |admission| Box::pin(hook(admission)));
        *lock(&self.authorizer) = Some(handler);
    }

    /// Register a command on the endpoint's shared registry.
    pub fn register<F, Fut>(&self, name: impl Into<String>, shape: wirecall_shape::Shape, handler: F)
    where
        F: Fn(crate::command::Request, Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<serde_json::Value, Fault>> + Send + 'static,
    {
        self.commands.register(name, shape, handler);
    }

    /// The shared command registry.
    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin accepting transport connections.
    pub fn start(&self) -> Result<()> {
        let listener = lock(&self.listener)
            .take()
            .ok_or(SessionError::AlreadyStarted)?;

        info!(path = ?self.path, "endpoint accepting connections");
        tokio::spawn(accept_loop(
            listener,
            self.commands.clone(),
            Arc::clone(&self.connections),
            Arc::clone(&self.authorizer),
            Arc::clone(&self.sink),
            self.shutdown.clone(),
        ));
        Ok(())
    }

    /// Look up a live connection by id.
    pub fn get_connection(&self, id: &str) -> Option<Connection> {
        lock(&self.connections).get(id).cloned()
    }

    /// Evict a connection from the registry and close it. Idempotent.
    pub fn remove_connection(&self, id: &str) {
        let removed = lock(&self.connections).remove(id);
        if let Some(connection) = removed {
            debug!(id, "connection evicted");
            connection.close();
        }
    }

    /// Ids of all currently registered connections.
    pub fn connection_ids(&self) -> Vec<String> {
        lock(&self.connections).keys().cloned().collect()
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Stop accepting and close every registered connection.
    pub fn close(&self) {
        self.shutdown.cancel();
        let connections: Vec<Connection> = lock(&self.connections).drain().map(|(_, c)| c).collect();
        for connection in connections {
            connection.close();
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.path)
            .field("connections", &self.connection_count())
            .field("commands", &self.commands.names())
            .finish()
    }
}

async fn accept_loop(
    listener: MessageListener,
    commands: CommandRegistry,
    connections: Arc<Mutex<HashMap<String, Connection>>>,
    authorizer: Arc<Mutex<Option<AuthorizationHandler>>>,
    sink: SharedSink,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    tokio::spawn(admit(
                        stream,
                        commands.clone(),
                        Arc::clone(&connections),
                        Arc::clone(&authorizer),
                        Arc::clone(&sink),
                    ));
                }
                Err(err) => {
                    // One failed accept doesn't stop the endpoint.
                    sink.report(Diagnostic {
                        kind: DiagnosticKind::Transport,
                        connection_id: None,
                        detail: format!("accept failed: {err}"),
                    });
                }
            },
        }
    }
}

/// Admission path for one accepted transport: assign an id, run the
/// authorization gate, and only then construct and register the
/// Connection. A rejected transport never becomes a Connection at all.
async fn admit(
    mut stream: MessageStream,
    commands: CommandRegistry,
    connections: Arc<Mutex<HashMap<String, Connection>>>,
    authorizer: Arc<Mutex<Option<AuthorizationHandler>>>,
    sink: SharedSink,
) {
    let id = generate_connection_id(&connections);
    let admission = Admission {
        connection_id: id.clone(),
        remote_address: stream.remote_address().to_string(),
        credentials: stream.peer_credentials(),
    };

    let hook = lock(&authorizer).clone();
    if let Some(hook) = hook {
        if let Err(fault) = hook(admission.clone()).await {
            sink.report(Diagnostic {
                kind: DiagnosticKind::AuthorizationDenied,
                connection_id: None,
                detail: format!(
                    "admission of {} refused: {fault}",
                    admission.remote_address
                ),
            });
            let _ = stream.close().await;
            return;
        }
    }

    let evict_from = Arc::clone(&connections);
    let connection = Connection::spawn(
        id.clone(),
        ConnectionRole::Acceptor,
        stream,
        commands,
        sink,
        Some(Box::new(move |closed_id: &str| {
            lock(&evict_from).remove(closed_id);
        })),
    );

    lock(&connections).insert(id.clone(), connection.clone());
    debug!(id = %id, remote = %connection.remote_address(), "connection admitted");

    // The transport may have died before the insert above; its eviction
    // hook runs only after the Closed transition, so this check closes
    // the race without leaking an entry.
    if connection.state() == ConnectionState::Closed {
        lock(&connections).remove(&id);
    }
}

fn generate_connection_id(connections: &Mutex<HashMap<String, Connection>>) -> String {
    let registered = lock(connections);
    loop {
        let id = format!("conn-{}", Uuid::new_v4());
        if !registered.contains_key(&id) {
            return id;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
