//! SCPI-style queries over TCP.
//!
//! The nanovoltmeter sits behind a TCP instrument gateway. Each query is written
//! with a `\n` terminator and answered by a single line.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{Connector, Transport};
use crate::error::{ConnectError, LinkError};

/// Default timeout for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Async TCP transport to the instrument gateway.
#[derive(Debug)]
pub struct TcpTransport {
    stream: BufReader<TcpStream>,
    peer: String,
}

impl TcpTransport {
    /// Connect to `address:port`, giving up after `connect_timeout`.
    pub async fn connect(
        address: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let failed = |reason: String| ConnectError::CouldNotCreateLink {
            address: address.to_string(),
            port,
            reason,
        };

        let stream = timeout(connect_timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|_| failed(format!("timed out after {} ms", connect_timeout.as_millis())))?
            .map_err(|e| failed(e.to_string()))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true).map_err(|e| failed(e.to_string()))?;

        tracing::info!(address, port, "Connected to instrument gateway");

        Ok(Self {
            stream: BufReader::new(stream),
            peer: format!("{}:{}", address, port),
        })
    }

    /// `address:port` this transport is connected to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Drop bytes that arrived after an earlier reply timed out.
    fn discard_pending(&mut self) {
        let buffered = self.stream.buffer().len();
        if buffered > 0 {
            tracing::debug!(bytes = buffered, "Discarding buffered stale reply bytes");
            self.stream.consume(buffered);
        }

        let mut discard = [0u8; 256];
        loop {
            match self.stream.get_ref().try_read(&mut discard) {
                Ok(0) => break,
                Ok(n) => tracing::debug!(bytes = n, "Discarded stale bytes from socket"),
                Err(_) => break,
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn query(&mut self, command: &str, timeout_after: Duration) -> Result<String, LinkError> {
        self.discard_pending();

        let line = format!("{}\n", command);
        tracing::debug!(peer = %self.peer, command, "Instrument query");

        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;

        let mut reply = String::new();
        match timeout(timeout_after, self.stream.read_line(&mut reply)).await {
            Ok(Ok(0)) => Err(LinkError::ConnectionClosed),
            Ok(Ok(_)) => {
                tracing::debug!(peer = %self.peer, reply = ?reply, "Instrument reply");
                Ok(reply)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(LinkError::Timeout {
                command: command.to_string(),
                timeout_ms: u64::try_from(timeout_after.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.stream.get_mut().shutdown().await?;
        tracing::info!(peer = %self.peer, "Closed instrument connection");
        Ok(())
    }
}

/// Opens [`TcpTransport`]s.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl TcpConnector {
    /// Connector with a custom connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, address: &str, port: u16) -> Result<Box<dyn Transport>, ConnectError> {
        let transport = TcpTransport::connect(address, port, self.connect_timeout).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn query_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"MEAS:FRES?\n");
            socket.write_all(b"1'+1.5E-04\n").await.unwrap();
        });

        let mut transport = TcpTransport::connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(transport.peer(), format!("127.0.0.1:{}", port));
        let reply = transport
            .query("MEAS:FRES?", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, "1'+1.5E-04\n");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_instrument_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(socket);
        });

        let mut transport = TcpTransport::connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        let err = transport
            .query("*IDN?", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LinkError::Timeout {
                command: "*IDN?".to_string(),
                timeout_ms: 50
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn closed_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut transport = TcpTransport::connect("127.0.0.1", port, DEFAULT_CONNECT_TIMEOUT)
            .await
            .unwrap();
        server.await.unwrap();
        let err = transport
            .query("*IDN?", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::ConnectionClosed | LinkError::Io(_)
        ));
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect_error() {
        // Bind then drop to obtain a port that is very likely closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = TcpConnector::default()
            .open("127.0.0.1", port)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConnectError::CouldNotCreateLink { port: p, .. } if p == port
        ));
    }
}
