//! Connection lifecycle.
//!
//! Every batch submission and every poll attempt opens its own session,
//! performs one exchange, and closes it. A `Session` owns its stream, so
//! the socket is released on every exit path, including early returns and
//! panics; `close` additionally shuts the write side down cleanly and is
//! safe to call any number of times.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::transport;
use crate::types::ClientError;

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Abstraction over how a session obtains its byte stream.
///
/// Production code dials TCP; tests can hand out in-memory pipes.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Establish one new connection to the server.
    async fn connect(&self) -> io::Result<Self::Stream>;

    /// Server address, for logging and error context.
    fn address(&self) -> &str;
}

/// Dials the lottery server over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        TcpStream::connect(&self.address).await
    }

    fn address(&self) -> &str {
        &self.address
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One live connection, good for a single request/response exchange.
pub struct Session<S> {
    stream: Option<S>,
    cancel: CancellationToken,
    client_id: u32,
    address: String,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Connect through `connector`, racing the shutdown token.
    ///
    /// On failure nothing is left open.
    pub async fn open<C>(
        connector: &C,
        cancel: &CancellationToken,
        client_id: u32,
    ) -> Result<Self, ClientError>
    where
        C: Connector<Stream = S> + ?Sized,
    {
        let address = connector.address().to_string();

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Stopped),
            result = connector.connect() => result,
        };

        match connected {
            Ok(stream) => {
                debug!(action = "connect", result = "success", client_id, address = %address);
                Ok(Self {
                    stream: Some(stream),
                    cancel: cancel.clone(),
                    client_id,
                    address,
                })
            }
            Err(source) => {
                error!(
                    action = "connect",
                    result = "fail",
                    client_id,
                    address = %address,
                    error = %source
                );
                Err(ClientError::Connection { address, source })
            }
        }
    }

    /// Whether the underlying stream is still held.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Send one frame on this session.
    pub async fn send(&mut self, frame: &str) -> Result<(), ClientError> {
        let stream = self.stream.as_mut().ok_or_else(|| closed_error("send_message"))?;
        transport::send_frame(stream, frame, &self.cancel).await
    }

    /// Receive one frame on this session, delimiter stripped.
    pub async fn receive(&mut self) -> Result<String, ClientError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| closed_error("receive_message"))?;
        transport::receive_frame(stream, &self.cancel).await
    }

    /// Shut the connection down. A no-op once closed.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        match stream.shutdown().await {
            Ok(()) => {
                debug!(action = "close_connection", result = "success", client_id = self.client_id);
                Ok(())
            }
            // Peer already tore the connection down; nothing left to release.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(source) => {
                error!(
                    action = "close_connection",
                    result = "fail",
                    client_id = self.client_id,
                    error = %source
                );
                Err(ClientError::Connection {
                    address: self.address.clone(),
                    source,
                })
            }
        }
    }
}

fn closed_error(action: &'static str) -> ClientError {
    ClientError::Transport {
        action,
        source: io::Error::new(io::ErrorKind::NotConnected, "session already closed"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
