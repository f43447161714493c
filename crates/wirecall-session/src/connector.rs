use std::path::Path;
use std::sync::Arc;

use wirecall_transport::MessageStream;

use crate::command::CommandRegistry;
use crate::connection::{Connection, ConnectionRole};
use crate::diagnostics::{SharedSink, TracingSink};
use crate::error::Result;

/// Connect to a listening endpoint with an empty command registry and
/// the default tracing diagnostic sink.
///
/// The protocol is fully bidirectional: register commands on the
/// returned connection's registry to let the remote endpoint invoke
/// them back.
pub async fn connect(path: impl AsRef<Path>) -> Result<Connection> {
    connect_with_config(path, CommandRegistry::new(), Arc::new(TracingSink)).await
}

/// Connect with an explicit command registry and diagnostic sink.
pub async fn connect_with_config(
    path: impl AsRef<Path>,
    commands: CommandRegistry,
    sink: SharedSink,
) -> Result<Connection> {
    let stream = MessageStream::connect(path).await?;
    Ok(Connection::attach(
        stream,
        ConnectionRole::Initiator,
        commands,
        sink,
    ))
}
