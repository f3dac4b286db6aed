use crate::domain::ports::{Endpoint, Transport};
use crate::error::{GatewayError, IoStage, Result};
use crate::protocol::frame::FrameCodec;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, trace};

/// Upper bound on a response frame; anything larger is treated as garbage.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Opens one TCP connection per exchange and reads back a single frame.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    frames: FrameCodec,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl TcpTransport {
    pub fn new(frames: FrameCodec, connect_timeout: Duration, response_timeout: Duration) -> Self {
        Self {
            frames,
            connect_timeout,
            response_timeout,
        }
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream> {
        let addr = (endpoint.host.as_str(), endpoint.port);
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(GatewayError::ConnectionRefused {
                endpoint: endpoint.to_string(),
                source,
            }),
            Err(_) => Err(GatewayError::Timeout {
                endpoint: endpoint.to_string(),
                stage: IoStage::Connect,
            }),
        }
    }

    /// Reads until one complete frame has arrived, dropping any noise that
    /// precedes the start marker.
    async fn read_frame(&self, stream: &mut TcpStream, endpoint: &Endpoint) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.response_timeout;
        let start = self.frames.codes().start;
        let mut buf = Vec::with_capacity(256);
        let mut received = 0usize;
        let mut chunk = [0u8; 1024];

        loop {
            let n = match timeout_at(deadline, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    return Err(GatewayError::Network {
                        endpoint: endpoint.to_string(),
                        reason: format!("connection closed after {} bytes", received),
                    });
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    return Err(GatewayError::Network {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(_) if received == 0 => {
                    return Err(GatewayError::Timeout {
                        endpoint: endpoint.to_string(),
                        stage: IoStage::Response,
                    });
                }
                Err(_) => {
                    return Err(GatewayError::Network {
                        endpoint: endpoint.to_string(),
                        reason: format!("timed out after {} bytes of response", received),
                    });
                }
            };
            received += n;
            buf.extend_from_slice(&chunk[..n]);

            match buf.iter().position(|b| *b == start) {
                Some(0) => {}
                Some(pos) => {
                    trace!(skipped = pos, "discarding bytes before start marker");
                    buf.drain(..pos);
                }
                None => {
                    buf.clear();
                    continue;
                }
            }

            if let Some(len) = self.frames.complete_len(&buf) {
                buf.truncate(len);
                return Ok(buf);
            }
            if buf.len() > MAX_FRAME_LEN {
                return Err(GatewayError::Framing(format!(
                    "no end marker within {} bytes",
                    MAX_FRAME_LEN
                )));
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn exchange(&self, endpoint: &Endpoint, frame: &[u8]) -> Result<Vec<u8>> {
        let mut stream = self.connect(endpoint).await?;
        debug!(endpoint = %endpoint, bytes = frame.len(), "sending frame");

        // From here on the host may have seen the request.
        stream
            .write_all(frame)
            .await
            .map_err(|e| GatewayError::Network {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let response = self.read_frame(&mut stream, endpoint).await?;
        let _ = stream.shutdown().await;
        Ok(response)
    }
}
