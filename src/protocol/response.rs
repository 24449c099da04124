use serde::Serialize;

use crate::file_id::FileId;
use crate::protocol::constants::{
    DOMAIN_NAME_LEN, FETCH_ENDPOINT_BODY_LEN, FIELD_SEPARATOR, FILE_INFO_BODY_LEN, GROUP_NAME_LEN,
    GROUP_STAT_LEN, IP_ADDRESS_LEN, PKG_LEN_SIZE, RECORD_SEPARATOR, SOURCE_IP_LEN,
    STORAGE_ID_LEN, STORAGE_STATUS_ACTIVE, STORAGE_STAT_COUNTERS, STORAGE_STAT_LEN,
    STORE_ENDPOINT_BODY_LEN, VERSION_LEN,
};
use crate::protocol::error::FrameError;
use crate::protocol::frame::Command;
use crate::protocol::request::Metadata;
use crate::transport::ServerAddr;

/// Storage node nominated by a tracker. Only valid for the operation it
/// was obtained for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEndpoint {
    pub group: String,
    pub host: String,
    pub port: u16,
    pub store_path_index: u8,
}

impl StorageEndpoint {
    pub fn addr(&self) -> ServerAddr {
        ServerAddr::new(self.host.clone(), self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub size: u64,
    /// Unix seconds
    pub created: u64,
    pub crc32: u32,
    pub source_ip: String,
}

/// Capacity and layout of one group, as the tracker sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStat {
    pub name: String,
    pub total_mb: u64,
    pub free_mb: u64,
    pub trunk_free_mb: u64,
    pub storage_count: u64,
    pub storage_port: u64,
    pub storage_http_port: u64,
    pub active_count: u64,
    pub current_write_server: u64,
    pub store_path_count: u64,
    pub subdir_count_per_path: u64,
    pub current_trunk_file_id: u64,
}

/// One storage node of a group. Only the identity, capacity and the
/// upload/download counters are kept from the tracker's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStat {
    pub status: u8,
    pub id: String,
    pub ip_addr: String,
    pub domain_name: String,
    pub source_id: String,
    pub version: String,
    /// Unix seconds
    pub join_time: u64,
    pub up_time: u64,
    pub total_mb: u64,
    pub free_mb: u64,
    pub upload_priority: u64,
    pub store_path_count: u64,
    pub subdir_count_per_path: u64,
    pub current_write_path: u64,
    pub storage_port: u64,
    pub storage_http_port: u64,
    pub total_upload_count: u64,
    pub success_upload_count: u64,
    pub total_download_count: u64,
    pub success_download_count: u64,
    pub last_heart_beat_time: u64,
    pub is_trunk_server: bool,
}

impl StorageStat {
    pub fn is_active(&self) -> bool {
        self.status == STORAGE_STATUS_ACTIVE
    }
}

/// Positions inside the counter block of a storage record
const UPLOAD_COUNTERS: usize = 0;
const DOWNLOAD_COUNTERS: usize = 12;
const LAST_HEART_BEAT: usize = STORAGE_STAT_COUNTERS - 1;

/// Decoded reply body, one shape per command family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Endpoint(StorageEndpoint),
    FileId(FileId),
    Content(Vec<u8>),
    FileInfo(FileInfo),
    Metadata(Metadata),
    Groups(Vec<GroupStat>),
    Servers(Vec<StorageStat>),
    Empty,
}

/// Interpret `body` as the reply to `command`.
pub fn decode_body(command: Command, body: Vec<u8>) -> Result<ResponseBody, FrameError> {
    let code = command.code();
    match command {
        Command::QueryStoreWithoutGroup | Command::QueryStoreWithGroup => {
            expect_len(code, &body, STORE_ENDPOINT_BODY_LEN)?;
            let mut endpoint = decode_endpoint(&body)?;
            endpoint.store_path_index = body[STORE_ENDPOINT_BODY_LEN - 1];
            Ok(ResponseBody::Endpoint(endpoint))
        }
        Command::QueryFetchOne | Command::QueryUpdate => {
            expect_len(code, &body, FETCH_ENDPOINT_BODY_LEN)?;
            Ok(ResponseBody::Endpoint(decode_endpoint(&body)?))
        }
        Command::UploadFile | Command::UploadAppenderFile | Command::UploadSlaveFile => {
            if body.len() <= GROUP_NAME_LEN {
                return Err(FrameError::BodyTooShort {
                    command: code,
                    minimum: GROUP_NAME_LEN + 1,
                    actual: body.len(),
                });
            }
            let group = fixed_str(&body[..GROUP_NAME_LEN], "group_name")?;
            let path = std::str::from_utf8(&body[GROUP_NAME_LEN..])
                .map_err(|_| FrameError::InvalidText("remote_filename"))?;
            let file_id = FileId::new(group, path).map_err(|_| FrameError::InvalidText("file_id"))?;
            Ok(ResponseBody::FileId(file_id))
        }
        Command::DownloadFile => Ok(ResponseBody::Content(body)),
        Command::QueryFileInfo => {
            expect_len(code, &body, FILE_INFO_BODY_LEN)?;
            Ok(ResponseBody::FileInfo(FileInfo {
                size: be_u64(&body[0..8]),
                created: be_u64(&body[8..16]),
                crc32: be_u64(&body[16..24]) as u32,
                source_ip: fixed_str(&body[24..24 + SOURCE_IP_LEN], "source_ip")?,
            }))
        }
        Command::GetMetadata => Ok(ResponseBody::Metadata(decode_metadata(&body)?)),
        Command::ListOneGroup => {
            expect_len(code, &body, GROUP_STAT_LEN)?;
            Ok(ResponseBody::Groups(vec![decode_group(&body)?]))
        }
        Command::ListAllGroups => {
            let groups = records(code, &body, GROUP_STAT_LEN)?
                .map(decode_group)
                .collect::<Result<Vec<_>, FrameError>>()?;
            Ok(ResponseBody::Groups(groups))
        }
        Command::ListStorage => {
            let servers = records(code, &body, STORAGE_STAT_LEN)?
                .map(decode_storage)
                .collect::<Result<Vec<_>, FrameError>>()?;
            Ok(ResponseBody::Servers(servers))
        }
        Command::DeleteFile
        | Command::SetMetadata
        | Command::AppendFile
        | Command::ModifyFile
        | Command::TruncateFile
        | Command::ActiveTest
        | Command::Response => {
            expect_len(code, &body, 0)?;
            Ok(ResponseBody::Empty)
        }
    }
}

impl ResponseBody {
    pub fn into_endpoint(self) -> Result<StorageEndpoint, FrameError> {
        match self {
            ResponseBody::Endpoint(endpoint) => Ok(endpoint),
            other => Err(other.mismatch()),
        }
    }

    pub fn into_file_id(self) -> Result<FileId, FrameError> {
        match self {
            ResponseBody::FileId(file_id) => Ok(file_id),
            other => Err(other.mismatch()),
        }
    }

    pub fn into_content(self) -> Result<Vec<u8>, FrameError> {
        match self {
            ResponseBody::Content(content) => Ok(content),
            other => Err(other.mismatch()),
        }
    }

    pub fn into_file_info(self) -> Result<FileInfo, FrameError> {
        match self {
            ResponseBody::FileInfo(info) => Ok(info),
            other => Err(other.mismatch()),
        }
    }

    pub fn into_metadata(self) -> Result<Metadata, FrameError> {
        match self {
            ResponseBody::Metadata(metadata) => Ok(metadata),
            other => Err(other.mismatch()),
        }
    }

    pub fn into_groups(self) -> Result<Vec<GroupStat>, FrameError> {
        match self {
            ResponseBody::Groups(groups) => Ok(groups),
            other => Err(other.mismatch()),
        }
    }

    pub fn into_servers(self) -> Result<Vec<StorageStat>, FrameError> {
        match self {
            ResponseBody::Servers(servers) => Ok(servers),
            other => Err(other.mismatch()),
        }
    }

    pub fn into_empty(self) -> Result<(), FrameError> {
        match self {
            ResponseBody::Empty => Ok(()),
            other => Err(other.mismatch()),
        }
    }

    fn mismatch(&self) -> FrameError {
        let kind = match self {
            ResponseBody::Endpoint(_) => "endpoint",
            ResponseBody::FileId(_) => "file id",
            ResponseBody::Content(_) => "content",
            ResponseBody::FileInfo(_) => "file info",
            ResponseBody::Metadata(_) => "metadata",
            ResponseBody::Groups(_) => "group list",
            ResponseBody::Servers(_) => "server list",
            ResponseBody::Empty => "empty",
        };
        FrameError::UnexpectedBody(kind)
    }
}

fn decode_endpoint(body: &[u8]) -> Result<StorageEndpoint, FrameError> {
    let group = fixed_str(&body[..GROUP_NAME_LEN], "group_name")?;
    let ip_end = GROUP_NAME_LEN + IP_ADDRESS_LEN;
    let host = fixed_str(&body[GROUP_NAME_LEN..ip_end], "ip_addr")?;
    let port = be_u64(&body[ip_end..ip_end + PKG_LEN_SIZE]);
    let port = u16::try_from(port).map_err(|_| FrameError::InvalidPort(port))?;
    Ok(StorageEndpoint {
        group,
        host,
        port,
        store_path_index: 0,
    })
}

/// Splits a listing body into fixed-width records
fn records(
    command: u8,
    body: &[u8],
    record: usize,
) -> Result<std::slice::ChunksExact<'_, u8>, FrameError> {
    if body.len() % record != 0 {
        return Err(FrameError::RecordLength {
            command,
            record,
            actual: body.len(),
        });
    }
    Ok(body.chunks_exact(record))
}

/// Sequential reader over one fixed-width record
struct Fields<'a> {
    raw: &'a [u8],
    at: usize,
}

impl<'a> Fields<'a> {
    fn new(raw: &'a [u8]) -> Self {
        Self { raw, at: 0 }
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let raw = self.raw;
        let field = &raw[self.at..self.at + len];
        self.at += len;
        field
    }

    fn u64(&mut self) -> u64 {
        be_u64(self.take(PKG_LEN_SIZE))
    }

    fn text(&mut self, len: usize, field: &'static str) -> Result<String, FrameError> {
        fixed_str(self.take(len), field)
    }
}

fn decode_group(raw: &[u8]) -> Result<GroupStat, FrameError> {
    let mut fields = Fields::new(raw);
    Ok(GroupStat {
        name: fields.text(GROUP_NAME_LEN + 1, "group_name")?,
        total_mb: fields.u64(),
        free_mb: fields.u64(),
        trunk_free_mb: fields.u64(),
        storage_count: fields.u64(),
        storage_port: fields.u64(),
        storage_http_port: fields.u64(),
        active_count: fields.u64(),
        current_write_server: fields.u64(),
        store_path_count: fields.u64(),
        subdir_count_per_path: fields.u64(),
        current_trunk_file_id: fields.u64(),
    })
}

fn decode_storage(raw: &[u8]) -> Result<StorageStat, FrameError> {
    let mut fields = Fields::new(raw);
    let status = fields.take(1)[0];
    let id = fields.text(STORAGE_ID_LEN, "id")?;
    let ip_addr = fields.text(SOURCE_IP_LEN, "ip_addr")?;
    let domain_name = fields.text(DOMAIN_NAME_LEN, "domain_name")?;
    let source_id = fields.text(STORAGE_ID_LEN, "src_id")?;
    let version = fields.text(VERSION_LEN, "version")?;
    let join_time = fields.u64();
    let up_time = fields.u64();
    let total_mb = fields.u64();
    let free_mb = fields.u64();
    let upload_priority = fields.u64();
    let store_path_count = fields.u64();
    let subdir_count_per_path = fields.u64();
    let current_write_path = fields.u64();
    let storage_port = fields.u64();
    let storage_http_port = fields.u64();
    let counters: Vec<u64> = (0..STORAGE_STAT_COUNTERS).map(|_| fields.u64()).collect();
    let is_trunk_server = fields.take(1)[0] != 0;

    Ok(StorageStat {
        status,
        id,
        ip_addr,
        domain_name,
        source_id,
        version,
        join_time,
        up_time,
        total_mb,
        free_mb,
        upload_priority,
        store_path_count,
        subdir_count_per_path,
        current_write_path,
        storage_port,
        storage_http_port,
        total_upload_count: counters[UPLOAD_COUNTERS],
        success_upload_count: counters[UPLOAD_COUNTERS + 1],
        total_download_count: counters[DOWNLOAD_COUNTERS],
        success_download_count: counters[DOWNLOAD_COUNTERS + 1],
        last_heart_beat_time: counters[LAST_HEART_BEAT],
        is_trunk_server,
    })
}

fn expect_len(command: u8, body: &[u8], expected: usize) -> Result<(), FrameError> {
    if body.len() != expected {
        return Err(FrameError::BodyLength {
            command,
            expected,
            actual: body.len(),
        });
    }
    Ok(())
}

/// Fixed-width text, right-trimmed of null and space padding
fn fixed_str(raw: &[u8], field: &'static str) -> Result<String, FrameError> {
    let end = raw
        .iter()
        .rposition(|&b| b != 0 && b != b' ')
        .map_or(0, |i| i + 1);
    std::str::from_utf8(&raw[..end])
        .map(str::to_string)
        .map_err(|_| FrameError::InvalidText(field))
}

fn be_u64(raw: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&raw[..8]);
    u64::from_be_bytes(buf)
}

pub fn decode_metadata(raw: &[u8]) -> Result<Metadata, FrameError> {
    let mut metadata = Metadata::new();
    if raw.is_empty() {
        return Ok(metadata);
    }
    for record in raw.split(|&b| b == RECORD_SEPARATOR) {
        let mut fields = record.splitn(2, |&b| b == FIELD_SEPARATOR);
        let key = fields.next().unwrap_or_default();
        let value = fields.next().unwrap_or_default();
        let key = std::str::from_utf8(key).map_err(|_| FrameError::InvalidText("metadata key"))?;
        let value =
            std::str::from_utf8(value).map_err(|_| FrameError::InvalidText("metadata value"))?;
        metadata.insert(key.to_string(), value.to_string());
    }
    Ok(metadata)
}
