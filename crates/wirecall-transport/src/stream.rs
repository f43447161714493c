use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::framing::{decode_message, encode_message, DEFAULT_MAX_MESSAGE};

/// Identity of the process on the other end of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
}

/// An ordered duplex message stream.
///
/// Messages are delivered whole and in order. `recv` returning `None`
/// means the peer closed cleanly; an error means the stream broke
/// mid-message.
pub struct MessageStream {
    inner: StreamInner,
    remote_address: String,
    max_message: usize,
}

enum StreamInner {
    #[cfg(unix)]
    Uds {
        stream: UnixStream,
        read_buf: BytesMut,
    },
    Memory {
        tx: Option<mpsc::Sender<Bytes>>,
        rx: mpsc::Receiver<Bytes>,
    },
}

impl MessageStream {
    /// Connect to a listening Unix domain socket.
    #[cfg(unix)]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| TransportError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        trace!(?path, "connected to unix domain socket");
        Ok(Self::from_uds(
            stream,
            format!("uds:{}", path.display()),
            DEFAULT_MAX_MESSAGE,
        ))
    }

    #[cfg(unix)]
    pub(crate) fn from_uds(stream: UnixStream, remote_address: String, max_message: usize) -> Self {
        Self {
            inner: StreamInner::Uds {
                stream,
                read_buf: BytesMut::with_capacity(8 * 1024),
            },
            remote_address,
            max_message,
        }
    }

    pub(crate) fn from_memory(
        tx: mpsc::Sender<Bytes>,
        rx: mpsc::Receiver<Bytes>,
        remote_address: String,
        max_message: usize,
    ) -> Self {
        Self {
            inner: StreamInner::Memory { tx: Some(tx), rx },
            remote_address,
            max_message,
        }
    }

    /// Send one message, framed, in its entirety.
    pub async fn send(&mut self, message: Bytes) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Uds { stream, .. } => {
                let mut framed = BytesMut::new();
                encode_message(&message, self.max_message, &mut framed)?;
                stream.write_all(&framed).await?;
                Ok(())
            }
            StreamInner::Memory { tx, .. } => {
                if message.len() > self.max_message {
                    return Err(TransportError::MessageTooLarge {
                        size: message.len(),
                        max: self.max_message,
                    });
                }
                match tx {
                    Some(tx) => tx
                        .send(message)
                        .await
                        .map_err(|_| TransportError::ConnectionClosed),
                    None => Err(TransportError::Closed),
                }
            }
        }
    }

    /// Receive the next message.
    ///
    /// `None` means the peer closed the stream cleanly.
    pub async fn recv(&mut self) -> Option<Result<Bytes>> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Uds { stream, read_buf } => loop {
                match decode_message(read_buf, self.max_message) {
                    Ok(Some(message)) => return Some(Ok(message)),
                    Ok(None) => {}
                    Err(err) => return Some(Err(err)),
                }
                match stream.read_buf(read_buf).await {
                    Ok(0) => {
                        if read_buf.is_empty() {
                            return None;
                        }
                        return Some(Err(TransportError::ConnectionClosed));
                    }
                    Ok(_) => {}
                    Err(err) => return Some(Err(err.into())),
                }
            },
            StreamInner::Memory { rx, .. } => rx.recv().await.map(Ok),
        }
    }

    /// Close the outbound half. The peer's `recv` will observe the close.
    pub async fn close(&mut self) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Uds { stream, .. } => Ok(stream.shutdown().await?),
            StreamInner::Memory { tx, .. } => {
                tx.take();
                Ok(())
            }
        }
    }

    /// Remote address of the peer, for diagnostics and admission checks.
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Credentials of the connected peer process, where the platform
    /// exposes them (UDS on Unix).
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Uds { stream, .. } => {
                let cred = stream.peer_cred().ok()?;
                Some(PeerCredentials {
                    uid: cred.uid(),
                    gid: cred.gid(),
                    pid: cred.pid(),
                })
            }
            StreamInner::Memory { .. } => None,
        }
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            #[cfg(unix)]
            StreamInner::Uds { .. } => "uds",
            StreamInner::Memory { .. } => "memory",
        };
        f.debug_struct("MessageStream")
            .field("type", &kind)
            .field("remote_address", &self.remote_address)
            .finish()
    }
}
