use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use wirecall_envelope::{Call, Meta};
use wirecall_shape::Shape;

use crate::connection::Connection;
use crate::fault::Fault;

/// Handler-facing view of an inbound call. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Request {
    cmd: String,
    meta: Meta,
    payload: Value,
}

impl Request {
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl From<&Call> for Request {
    fn from(call: &Call) -> Self {
        Self {
            cmd: call.cmd.clone(),
            meta: call.meta.clone(),
            payload: call.payload.clone(),
        }
    }
}

/// Future returned by a command handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, Fault>> + Send>>;

/// Type-erased command handler.
///
/// Handlers receive the request and the connection it arrived on, so
/// they can invoke commands back on the peer.
pub type Handler = Arc<dyn Fn(Request, Connection) -> HandlerFuture + Send + Sync>;

/// A named, shape-validated operation.
#[derive(Clone)]
pub struct Command {
    name: String,
    shape: Shape,
    handler: Handler,
}

impl Command {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub(crate) fn handler(&self) -> Handler {
        self.handler.clone()
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Mapping from command name to its shape and handler.
///
/// Read-mostly: one registry is shared by reference across every
/// connection of an endpoint. Registration takes the write lock and
/// replaces any prior binding of the same name; lookups clone the
/// binding out under the read lock, so a lookup never observes a
/// half-registered command.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    inner: Arc<RwLock<HashMap<String, Command>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, replacing any prior binding of `name`.
    pub fn register<F, Fut>(&self, name: impl Into<String>, shape: Shape, handler: F)
    where
        F: Fn(Request, Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, Fault>> + Send + 'static,
    {
        let name = name.into();
        let handler: Handler = Arc::new(move |request, connection| {
            Box::pin(handler(request, connection))
        });
        let command = Command {
            name: name.clone(),
            shape,
            handler,
        };
        write_lock(&self.inner).insert(name, command);
    }

    /// Look up a command by name.
    pub fn lookup(&self, name: &str) -> Option<Command> {
        read_lock(&self.inner).get(name).cloned()
    }

    /// Remove a command binding. Returns whether one existed.
    pub fn unregister(&self, name: &str) -> bool {
        write_lock(&self.inner).remove(name).is_some()
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.inner).keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        read_lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.inner).is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

// A poisoned registry lock only means another thread panicked mid-insert;
// the map itself is still a valid map, so recover rather than propagate.
fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
