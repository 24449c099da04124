use std::io::{self, Read};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read until `buf` is full or the peer closes; returns how much arrived.
/// Short reads are retried.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub async fn read_full_async<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Scratch buffer for streaming `len` bytes, never larger than `chunk`
pub fn scratch(len: u64, chunk: usize) -> Vec<u8> {
    vec![0u8; len.min(chunk as u64).max(1) as usize]
}
