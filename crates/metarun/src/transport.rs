//! # Transport Abstraction
//!
//! A minimal, async interface for moving request bytes to a server and the
//! reply bytes back.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: the transport knows nothing about chains or descriptors.
//!   It moves opaque buffers.
//! - **Request-Response**: one request, one reply. A commit is a single round trip.
//! - **Ordered**: a transport must deliver requests from one session in the order
//!   they were issued. Both transports here do.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::server::Server;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to send a byte buffer and receive a reply.
///
/// Object-safe, so sessions hold an `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a payload and waits for the reply bytes.
    ///
    /// Must not interpret the payload.
    async fn call(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// In-process loopback straight into a [`Server`].
pub struct LocalTransport {
    server: Arc<Server>,
}

impl LocalTransport {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    async fn call(&self, payload: &[u8]) -> Result<Vec<u8>> {
        self.server.handle(payload).map_err(|e| Error::Io(e.to_string()))
    }
}

struct Envelope {
    payload: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<u8>>>,
}

/// A transport backed by a tokio channel into a server task.
///
/// The server task drains requests one at a time, which gives every session
/// the single logical thread of execution the protocol assumes.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelTransport {
    /// Spawns the server pump and returns a transport connected to it.
    ///
    /// The pump exits once every clone of the transport is dropped.
    pub fn spawn(server: Arc<Server>) -> (Self, JoinHandle<()>) {
        Self::spawn_with(move |payload| server.handle(payload))
    }

    fn spawn_with<F>(handle: F) -> (Self, JoinHandle<()>)
    where
        F: Fn(&[u8]) -> metarpc::Result<Vec<u8>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let pump = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let reply = handle(&envelope.payload).map_err(|e| {
                    tracing::warn!(error = %e, "reply could not be produced");
                    Error::Io(e.to_string())
                });
                // The caller may have gone away; nothing to do then.
                let _ = envelope.reply.send(reply);
            }
            tracing::debug!("channel transport closed");
        });
        (Self { tx }, pump)
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn call(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let (reply, wait) = oneshot::channel();
        self.tx
            .send(Envelope { payload: payload.to_vec(), reply })
            .map_err(|_| Error::ConnectionLost("Server task stopped".into()))?;
        wait.await.map_err(|_| Error::ConnectionLost("Server dropped the request".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_reply_reaches_caller_and_pump_survives() {
        let (transport, _pump) = ChannelTransport::spawn_with(|payload| match payload {
            b"bad" => Err(metarpc::Error::ProtocolViolation("cannot encode".into())),
            other => Ok(other.to_vec()),
        });

        let err = transport.call(b"bad").await.unwrap_err();
        assert!(matches!(&err, Error::Io(msg) if msg.contains("cannot encode")), "got {}", err);
        assert_eq!(transport.call(b"ping").await.unwrap(), b"ping".to_vec());
    }

    #[tokio::test]
    async fn test_stopped_pump_is_connection_lost() {
        let (transport, pump) = ChannelTransport::spawn_with(|payload| Ok(payload.to_vec()));
        pump.abort();
        let _ = pump.await;
        let err = transport.call(b"ping").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost(_)));
    }
}
