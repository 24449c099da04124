use std::collections::BTreeMap;

use crate::file_id::FileId;
use crate::protocol::constants::{
    EXT_NAME_LEN, FIELD_SEPARATOR, GROUP_NAME_LEN, PKG_LEN_SIZE, PREFIX_NAME_LEN, RECORD_SEPARATOR,
};
use crate::protocol::frame::{Command, OutboundFrame};

/// Key/value metadata attached to a stored file
pub type Metadata = BTreeMap<String, String>;

/// How `set_metadata` combines with what is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataMode {
    #[default]
    Overwrite,
    Merge,
}

impl MetadataMode {
    pub fn flag(self) -> u8 {
        match self {
            MetadataMode::Overwrite => b'O',
            MetadataMode::Merge => b'M',
        }
    }
}

/// Byte window of a download; `length == 0` reads to the end of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }
}

/// One variant per command, each with its own field set. Group names and
/// extensions must already be validated (see `file_id`).
#[derive(Debug, Clone)]
pub enum Request<'a> {
    QueryStore { group: Option<&'a str> },
    QueryFetch { file_id: &'a FileId },
    QueryUpdate { file_id: &'a FileId },
    Upload {
        store_path_index: u8,
        ext: &'a str,
        data: &'a [u8],
        appender: bool,
    },
    Download { file_id: &'a FileId, range: ByteRange },
    Delete { file_id: &'a FileId },
    SetMetadata {
        file_id: &'a FileId,
        metadata: &'a Metadata,
        mode: MetadataMode,
    },
    GetMetadata { file_id: &'a FileId },
    QueryFileInfo { file_id: &'a FileId },
    Append { file_id: &'a FileId, data: &'a [u8] },
    /// Overwrite part of an appender file in place
    Modify {
        file_id: &'a FileId,
        offset: u64,
        data: &'a [u8],
    },
    Truncate { file_id: &'a FileId, size: u64 },
    /// A new file named after `master` plus `prefix`
    UploadSlave {
        master: &'a FileId,
        prefix: &'a str,
        ext: &'a str,
        data: &'a [u8],
    },
    /// One group, or every group when `group` is `None`
    ListGroups { group: Option<&'a str> },
    /// Storage nodes of a group, optionally narrowed to one node
    ListServers {
        group: &'a str,
        storage_ip: Option<&'a str>,
    },
    ActiveTest,
}

impl<'a> Request<'a> {
    pub fn command(&self) -> Command {
        match self {
            Request::QueryStore { group: None } => Command::QueryStoreWithoutGroup,
            Request::QueryStore { group: Some(_) } => Command::QueryStoreWithGroup,
            Request::QueryFetch { .. } => Command::QueryFetchOne,
            Request::QueryUpdate { .. } => Command::QueryUpdate,
            Request::Upload { appender: false, .. } => Command::UploadFile,
            Request::Upload { appender: true, .. } => Command::UploadAppenderFile,
            Request::Download { .. } => Command::DownloadFile,
            Request::Delete { .. } => Command::DeleteFile,
            Request::SetMetadata { .. } => Command::SetMetadata,
            Request::GetMetadata { .. } => Command::GetMetadata,
            Request::QueryFileInfo { .. } => Command::QueryFileInfo,
            Request::Append { .. } => Command::AppendFile,
            Request::Modify { .. } => Command::ModifyFile,
            Request::Truncate { .. } => Command::TruncateFile,
            Request::UploadSlave { .. } => Command::UploadSlaveFile,
            Request::ListGroups { group: None } => Command::ListAllGroups,
            Request::ListGroups { group: Some(_) } => Command::ListOneGroup,
            Request::ListServers { .. } => Command::ListStorage,
            Request::ActiveTest => Command::ActiveTest,
        }
    }

    pub fn encode(&self) -> OutboundFrame<'a> {
        let command = self.command();
        let mut body = Vec::new();
        let mut payload: &'a [u8] = &[];

        match *self {
            Request::QueryStore { group } | Request::ListGroups { group } => {
                if let Some(group) = group {
                    put_fixed(&mut body, group, GROUP_NAME_LEN);
                }
            }
            Request::QueryFetch { file_id }
            | Request::QueryUpdate { file_id }
            | Request::Delete { file_id }
            | Request::GetMetadata { file_id }
            | Request::QueryFileInfo { file_id } => {
                put_file_id(&mut body, file_id);
            }
            Request::Upload {
                store_path_index,
                ext,
                data,
                ..
            } => {
                body.push(store_path_index);
                body.extend_from_slice(&(data.len() as u64).to_be_bytes());
                put_fixed(&mut body, ext, EXT_NAME_LEN);
                payload = data;
            }
            Request::Download { file_id, range } => {
                body.extend_from_slice(&range.offset.to_be_bytes());
                body.extend_from_slice(&range.length.to_be_bytes());
                put_file_id(&mut body, file_id);
            }
            Request::SetMetadata {
                file_id,
                metadata,
                mode,
            } => {
                let meta = encode_metadata(metadata);
                body.extend_from_slice(&(file_id.path().len() as u64).to_be_bytes());
                body.extend_from_slice(&(meta.len() as u64).to_be_bytes());
                body.push(mode.flag());
                put_file_id(&mut body, file_id);
                body.extend_from_slice(&meta);
            }
            Request::Append { file_id, data } => {
                body.extend_from_slice(&(file_id.path().len() as u64).to_be_bytes());
                body.extend_from_slice(&(data.len() as u64).to_be_bytes());
                body.extend_from_slice(file_id.path().as_bytes());
                payload = data;
            }
            Request::Modify {
                file_id,
                offset,
                data,
            } => {
                body.extend_from_slice(&(file_id.path().len() as u64).to_be_bytes());
                body.extend_from_slice(&offset.to_be_bytes());
                body.extend_from_slice(&(data.len() as u64).to_be_bytes());
                body.extend_from_slice(file_id.path().as_bytes());
                payload = data;
            }
            Request::Truncate { file_id, size } => {
                body.extend_from_slice(&(file_id.path().len() as u64).to_be_bytes());
                body.extend_from_slice(&size.to_be_bytes());
                body.extend_from_slice(file_id.path().as_bytes());
            }
            Request::UploadSlave {
                master,
                prefix,
                ext,
                data,
            } => {
                body.extend_from_slice(&(master.path().len() as u64).to_be_bytes());
                body.extend_from_slice(&(data.len() as u64).to_be_bytes());
                put_fixed(&mut body, prefix, PREFIX_NAME_LEN);
                put_fixed(&mut body, ext, EXT_NAME_LEN);
                body.extend_from_slice(master.path().as_bytes());
                payload = data;
            }
            Request::ListServers { group, storage_ip } => {
                put_fixed(&mut body, group, GROUP_NAME_LEN);
                if let Some(ip) = storage_ip {
                    body.extend_from_slice(ip.as_bytes());
                }
            }
            Request::ActiveTest => {}
        }

        OutboundFrame::new(command, &body, payload)
    }
}

/// Null-padded fixed-width field
fn put_fixed(buf: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(width);
    buf.extend_from_slice(&bytes[..n]);
    buf.resize(buf.len() + (width - n), 0);
}

fn put_file_id(buf: &mut Vec<u8>, file_id: &FileId) {
    put_fixed(buf, file_id.group(), GROUP_NAME_LEN);
    buf.extend_from_slice(file_id.path().as_bytes());
}

pub fn encode_metadata(metadata: &Metadata) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, (key, value)) in metadata.iter().enumerate() {
        if i > 0 {
            out.push(RECORD_SEPARATOR);
        }
        out.extend_from_slice(key.as_bytes());
        out.push(FIELD_SEPARATOR);
        out.extend_from_slice(value.as_bytes());
    }
    out
}

/// Upload body bytes that precede the file contents
pub const UPLOAD_FIXED_LEN: usize = 1 + PKG_LEN_SIZE + EXT_NAME_LEN;

/// Slave upload body bytes that precede the master path
pub const UPLOAD_SLAVE_FIXED_LEN: usize = 2 * PKG_LEN_SIZE + PREFIX_NAME_LEN + EXT_NAME_LEN;
