use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Error, Result, TransportError};
use crate::protocol::constants::READ_CHUNK;
use crate::protocol::error::FrameError;
use crate::protocol::frame::{Header, OutboundFrame, Reply};
use crate::transport::{accept_header, ServerAddr, Transport};
use crate::utils::io::{read_full, scratch};

/// Thread-per-call transport over `std::net`
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    network_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, network_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            network_timeout,
        }
    }

    fn connect(&self, addr: &ServerAddr) -> std::result::Result<TcpStream, TransportError> {
        let target = addr.to_string();
        let candidates = (addr.host.as_str(), addr.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                addr: target.clone(),
                source,
            })?;

        let mut last_error = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.network_timeout))
                        .and_then(|_| stream.set_write_timeout(Some(self.network_timeout)))
                        .map_err(|source| TransportError::from_io(&target, source))?;
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Could not set TCP_NODELAY on {}: {}", target, e);
                    }
                    trace!("Connected to {}", target);
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(source) if source.kind() == io::ErrorKind::TimedOut => {
                TransportError::Timeout { addr: target }
            }
            Some(source) => TransportError::Connect {
                addr: target,
                source,
            },
            None => TransportError::Resolve {
                addr: target,
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
            },
        })
    }

    fn exchange(
        &self,
        addr: &ServerAddr,
        frame: &OutboundFrame<'_>,
        sink: &mut dyn Write,
    ) -> Result<Header> {
        let target = addr.to_string();
        let io_err = |source| TransportError::from_io(&target, source);

        debug!(
            "-> {} command={} len={}",
            target,
            frame.command.code(),
            frame.len()
        );
        let mut stream = self.connect(addr)?;
        stream.write_all(&frame.prefix).map_err(io_err)?;
        if !frame.payload.is_empty() {
            stream.write_all(frame.payload).map_err(io_err)?;
        }
        stream.flush().map_err(io_err)?;

        let mut header_buf = [0u8; Header::SIZE];
        let filled = read_full(&mut stream, &mut header_buf).map_err(io_err)?;
        let header = accept_header(&header_buf, filled)?;
        debug!(
            "<- {} status={} len={}",
            target, header.status, header.length
        );

        if header.is_ok() {
            copy_body(&mut stream, header.length, sink, &target)?;
        } else {
            copy_body(&mut stream, header.length, &mut io::sink(), &target)?;
        }
        Ok(header)
    }
}

/// Moves exactly `len` bytes from the socket into `sink`.
fn copy_body(stream: &mut TcpStream, len: u64, sink: &mut dyn Write, target: &str) -> Result<()> {
    let mut buf = scratch(len, READ_CHUNK);
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = match stream.read(&mut buf[..want]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::from_io(target, e).into()),
        };
        if n == 0 {
            return Err(FrameError::Truncated {
                expected: len,
                actual: len - remaining,
            }
            .into());
        }
        sink.write_all(&buf[..n]).map_err(Error::Local)?;
        remaining -= n as u64;
    }
    sink.flush().map_err(Error::Local)?;
    Ok(())
}

impl Transport for TcpTransport {
    fn send_receive(&self, addr: &ServerAddr, frame: &OutboundFrame<'_>) -> Result<Reply> {
        let mut body = Vec::new();
        let header = self.exchange(addr, frame, &mut body)?;
        Ok(Reply { header, body })
    }

    fn send_receive_into(
        &self,
        addr: &ServerAddr,
        frame: &OutboundFrame<'_>,
        sink: &mut dyn Write,
    ) -> Result<Header> {
        self.exchange(addr, frame, sink)
    }
}
