use std::io::{self, Read};

use crc32fast::Hasher;

use crate::protocol::constants::READ_CHUNK;

/// CRC32 of a byte slice, as storage nodes report it in file info
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// CRC32 of everything `reader` yields, read in bounded chunks.
pub fn crc32_reader<R: Read>(mut reader: R) -> io::Result<u32> {
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize())
}

pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}
