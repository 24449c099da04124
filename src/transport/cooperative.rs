use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result, TransportError};
use crate::protocol::constants::READ_CHUNK;
use crate::protocol::error::FrameError;
use crate::protocol::frame::{Header, OutboundFrame, Reply};
use crate::transport::{accept_header, AsyncTransport, ServerAddr};
use crate::utils::io::{read_full_async, scratch};

/// Tokio transport. Each socket step suspends the task instead of a thread;
/// dropping an in-flight future closes its socket.
#[derive(Debug, Clone)]
pub struct TokioTransport {
    connect_timeout: Duration,
    network_timeout: Duration,
}

impl TokioTransport {
    pub fn new(connect_timeout: Duration, network_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            network_timeout,
        }
    }

    /// Bounds one socket step by the network timeout
    async fn step<T, F>(&self, target: &str, fut: F) -> std::result::Result<T, TransportError>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match timeout(self.network_timeout, fut).await {
            Ok(result) => result.map_err(|source| TransportError::from_io(target, source)),
            Err(_) => Err(TransportError::Timeout {
                addr: target.to_string(),
            }),
        }
    }

    async fn connect(&self, addr: &ServerAddr) -> std::result::Result<TcpStream, TransportError> {
        let target = addr.to_string();
        let connecting = TcpStream::connect((addr.host.as_str(), addr.port));
        match timeout(self.connect_timeout, connecting).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not set TCP_NODELAY on {}: {}", target, e);
                }
                trace!("Connected to {}", target);
                Ok(stream)
            }
            Ok(Err(source)) => Err(TransportError::Connect {
                addr: target,
                source,
            }),
            Err(_) => Err(TransportError::Timeout { addr: target }),
        }
    }

    async fn exchange(
        &self,
        addr: &ServerAddr,
        frame: &OutboundFrame<'_>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Header> {
        let target = addr.to_string();

        debug!(
            "-> {} command={} len={}",
            target,
            frame.command.code(),
            frame.len()
        );
        let mut stream = self.connect(addr).await?;
        self.step(&target, stream.write_all(&frame.prefix)).await?;
        if !frame.payload.is_empty() {
            self.step(&target, stream.write_all(frame.payload)).await?;
        }
        self.step(&target, stream.flush()).await?;

        let mut header_buf = [0u8; Header::SIZE];
        let filled = self
            .step(&target, read_full_async(&mut stream, &mut header_buf))
            .await?;
        let header = accept_header(&header_buf, filled)?;
        debug!(
            "<- {} status={} len={}",
            target, header.status, header.length
        );

        if header.is_ok() {
            self.copy_body(&mut stream, header.length, sink, &target).await?;
        } else {
            self.copy_body(&mut stream, header.length, &mut tokio::io::sink(), &target)
                .await?;
        }
        Ok(header)
    }

    async fn copy_body(
        &self,
        stream: &mut TcpStream,
        len: u64,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        target: &str,
    ) -> Result<()> {
        let mut buf = scratch(len, READ_CHUNK);
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = self.step(target, stream.read(&mut buf[..want])).await?;
            if n == 0 {
                return Err(FrameError::Truncated {
                    expected: len,
                    actual: len - remaining,
                }
                .into());
            }
            sink.write_all(&buf[..n]).await.map_err(Error::Local)?;
            remaining -= n as u64;
        }
        sink.flush().await.map_err(Error::Local)?;
        Ok(())
    }
}

#[async_trait]
impl AsyncTransport for TokioTransport {
    async fn send_receive(&self, addr: &ServerAddr, frame: &OutboundFrame<'_>) -> Result<Reply> {
        let mut body = Vec::new();
        let header = self.exchange(addr, frame, &mut body).await?;
        Ok(Reply { header, body })
    }

    async fn send_receive_into(
        &self,
        addr: &ServerAddr,
        frame: &OutboundFrame<'_>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Header> {
        self.exchange(addr, frame, sink).await
    }
}
