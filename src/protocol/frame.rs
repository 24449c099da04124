use crate::protocol::constants::{HEADER_SIZE, MAX_BODY_LEN};
use crate::protocol::error::FrameError;
use tracing::error;

/// Command byte of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    UploadFile = 11,
    DeleteFile = 12,
    SetMetadata = 13,
    DownloadFile = 14,
    GetMetadata = 15,
    UploadSlaveFile = 21,
    QueryFileInfo = 22,
    UploadAppenderFile = 23,
    AppendFile = 24,
    ModifyFile = 34,
    TruncateFile = 36,
    ListOneGroup = 90,
    ListAllGroups = 91,
    ListStorage = 92,
    /// Carried by every server reply
    Response = 100,
    QueryStoreWithoutGroup = 101,
    QueryFetchOne = 102,
    QueryUpdate = 103,
    QueryStoreWithGroup = 104,
    ActiveTest = 111,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let command = match code {
            11 => Command::UploadFile,
            12 => Command::DeleteFile,
            13 => Command::SetMetadata,
            14 => Command::DownloadFile,
            15 => Command::GetMetadata,
            21 => Command::UploadSlaveFile,
            22 => Command::QueryFileInfo,
            23 => Command::UploadAppenderFile,
            24 => Command::AppendFile,
            34 => Command::ModifyFile,
            36 => Command::TruncateFile,
            90 => Command::ListOneGroup,
            91 => Command::ListAllGroups,
            92 => Command::ListStorage,
            100 => Command::Response,
            101 => Command::QueryStoreWithoutGroup,
            102 => Command::QueryFetchOne,
            103 => Command::QueryUpdate,
            104 => Command::QueryStoreWithGroup,
            111 => Command::ActiveTest,
            _ => return None,
        };
        Some(command)
    }
}

/// Fixed-size frame header (10 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u64,
    pub command: u8,
    pub status: u8,
}

impl Header {
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(length: u64, command: Command) -> Self {
        Self {
            length,
            command: command.code(),
            status: 0,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < Self::SIZE {
            error!("Frame header too short: {} bytes", buf.len());
            return Err(FrameError::Truncated {
                expected: Self::SIZE as u64,
                actual: buf.len() as u64,
            });
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[0..8]);
        let declared = i64::from_be_bytes(len_bytes);
        if declared < 0 {
            error!("Frame header declares negative length {}", declared);
            return Err(FrameError::NegativeLength(declared));
        }
        let length = declared as u64;
        if length > MAX_BODY_LEN {
            error!("Frame header declares {} bytes (max: {})", length, MAX_BODY_LEN);
            return Err(FrameError::FrameTooLarge(length));
        }

        Ok(Self {
            length,
            command: buf[8],
            status: buf[9],
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.length.to_be_bytes());
        buf[8] = self.command;
        buf[9] = self.status;
        buf
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Request frame ready for the socket. File contents stay borrowed in
/// `payload` so large uploads are never copied into the prefix buffer.
#[derive(Debug, Clone)]
pub struct OutboundFrame<'a> {
    pub command: Command,
    /// Header followed by every non-payload body field
    pub prefix: Vec<u8>,
    pub payload: &'a [u8],
}

impl<'a> OutboundFrame<'a> {
    /// `body` is the fixed and variable fields preceding the payload.
    pub fn new(command: Command, body: &[u8], payload: &'a [u8]) -> Self {
        let header = Header::new((body.len() + payload.len()) as u64, command);
        let mut prefix = Vec::with_capacity(Header::SIZE + body.len());
        prefix.extend_from_slice(&header.encode());
        prefix.extend_from_slice(body);
        Self {
            command,
            prefix,
            payload,
        }
    }

    pub fn len(&self) -> usize {
        self.prefix.len() + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(self.payload);
        out
    }
}

/// Header + body as one buffer, length taken from `body`.
pub fn encode_frame(command: Command, body: &[u8]) -> Vec<u8> {
    OutboundFrame::new(command, body, &[]).to_bytes()
}

/// A complete reply frame
#[derive(Debug, Clone)]
pub struct Reply {
    pub header: Header,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn status(&self) -> u8 {
        self.header.status
    }
}
