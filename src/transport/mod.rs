//! One connection per exchange: connect, write the request frame, read the
//! 10-byte header, read exactly `header.length` body bytes, close.
//!
//! Two interchangeable implementations put identical bytes on the wire:
//! [`TcpTransport`] blocks the calling thread, [`TokioTransport`] suspends
//! the calling task at each socket boundary.

pub mod blocking;
pub mod cooperative;

use std::fmt;
use std::io::Write;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::{ConfigError, Result};
use crate::protocol::constants::DEFAULT_TRACKER_PORT;
use crate::protocol::frame::{Command, Header, OutboundFrame, Reply};
use crate::protocol::error::FrameError;
use crate::protocol::request::Request;

pub use blocking::TcpTransport;
pub use cooperative::TokioTransport;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host`, `host:port`, or `[v6addr]:port`.
    pub fn parse(text: &str) -> std::result::Result<Self, ConfigError> {
        let text = text.trim();
        let invalid = || ConfigError::InvalidTracker(text.to_string());
        if text.is_empty() {
            return Err(invalid());
        }

        if let Some(rest) = text.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail.strip_prefix(':') {
                Some(port) => port.parse().map_err(|_| invalid())?,
                None if tail.is_empty() => DEFAULT_TRACKER_PORT,
                None => return Err(invalid()),
            };
            return Ok(Self::new(host, port));
        }

        match text.split_once(':') {
            Some((host, port)) if !port.contains(':') => {
                if host.is_empty() {
                    return Err(invalid());
                }
                let port = port.parse().map_err(|_| invalid())?;
                Ok(Self::new(host, port))
            }
            // bare IPv6 literal
            Some(_) => Ok(Self::new(text, DEFAULT_TRACKER_PORT)),
            None => Ok(Self::new(text, DEFAULT_TRACKER_PORT)),
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Blocking request/response capability
pub trait Transport: Send + Sync {
    /// Full round trip with the body buffered.
    fn send_receive(&self, addr: &ServerAddr, frame: &OutboundFrame<'_>) -> Result<Reply>;

    /// Round trip that streams a successful body into `sink`. On a nonzero
    /// status nothing is written to `sink`.
    fn send_receive_into(
        &self,
        addr: &ServerAddr,
        frame: &OutboundFrame<'_>,
        sink: &mut dyn Write,
    ) -> Result<Header>;

    fn active_test(&self, addr: &ServerAddr) -> Result<bool> {
        let reply = self.send_receive(addr, &Request::ActiveTest.encode())?;
        Ok(reply.header.is_ok())
    }
}

/// Suspending request/response capability
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn send_receive(&self, addr: &ServerAddr, frame: &OutboundFrame<'_>) -> Result<Reply>;

    async fn send_receive_into(
        &self,
        addr: &ServerAddr,
        frame: &OutboundFrame<'_>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<Header>;

    async fn active_test(&self, addr: &ServerAddr) -> Result<bool> {
        let reply = self.send_receive(addr, &Request::ActiveTest.encode()).await?;
        Ok(reply.header.is_ok())
    }
}

/// Checks a freshly read header buffer; `filled` is how many bytes arrived.
pub(crate) fn accept_header(buf: &[u8; Header::SIZE], filled: usize) -> Result<Header> {
    if filled < Header::SIZE {
        return Err(FrameError::Truncated {
            expected: Header::SIZE as u64,
            actual: filled as u64,
        }
        .into());
    }
    let header = Header::decode(buf)?;
    if header.command != Command::Response.code() {
        return Err(FrameError::UnexpectedCommand(header.command).into());
    }
    Ok(header)
}
