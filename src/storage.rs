//! Data transfer against the storage node a tracker nominated.

use std::io::Write;

use serde::Serialize;
use tokio::io::AsyncWrite;
use tracing::{info, warn};

use crate::error::{Result, StorageError};
use crate::file_id::{normalize_extension, validate_prefix, FileId};
use crate::protocol::frame::{Command, Header, Reply};
use crate::protocol::request::{ByteRange, Metadata, MetadataMode, Request};
use crate::protocol::response::{decode_body, FileInfo, ResponseBody, StorageEndpoint};
use crate::transport::{AsyncTransport, Transport};

pub const DELETE_STATUS: &str = "Delete file succeeded.";

/// Outcome of one upload. Not retained by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub file_id: FileId,
    /// Bytes sent
    pub size: u64,
    pub storage_ip: String,
}

/// Confirmation of a delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReceipt {
    pub status: String,
    pub file_id: FileId,
    pub storage_ip: String,
}

pub struct StorageClient<'a, T> {
    transport: &'a T,
    endpoint: &'a StorageEndpoint,
}

impl<'a, T: Transport> StorageClient<'a, T> {
    pub fn new(transport: &'a T, endpoint: &'a StorageEndpoint) -> Self {
        Self { transport, endpoint }
    }

    pub fn upload(&self, data: &[u8], ext: &str) -> Result<UploadResult> {
        self.upload_with(data, ext, false)
    }

    /// Upload a file that can later be appended to or truncated.
    pub fn upload_appender(&self, data: &[u8], ext: &str) -> Result<UploadResult> {
        self.upload_with(data, ext, true)
    }

    fn upload_with(&self, data: &[u8], ext: &str, appender: bool) -> Result<UploadResult> {
        let request = Request::Upload {
            store_path_index: self.endpoint.store_path_index,
            ext: normalize_extension(ext)?,
            data,
            appender,
        };
        let reply = self.round_trip(&request)?;
        upload_result(self.endpoint, request.command(), None, data.len(), reply)
    }

    /// Store `data` as a slave of `master`: the node names it after the
    /// master's file name with `prefix` spliced in before the extension.
    pub fn upload_slave(&self, master: &FileId, prefix: &str, data: &[u8], ext: &str) -> Result<UploadResult> {
        validate_prefix(prefix)?;
        let request = Request::UploadSlave {
            master,
            prefix,
            ext: normalize_extension(ext)?,
            data,
        };
        let reply = self.round_trip(&request)?;
        upload_result(self.endpoint, request.command(), Some(master), data.len(), reply)
    }

    pub fn download(&self, file_id: &FileId, range: ByteRange) -> Result<Vec<u8>> {
        let reply = self.round_trip(&Request::Download { file_id, range })?;
        Ok(interpret(Command::DownloadFile, Some(file_id), reply)?.into_content()?)
    }

    /// Streams the file into `sink`; returns the byte count. Nothing is
    /// written when the node reports an error.
    pub fn download_into(&self, file_id: &FileId, range: ByteRange, sink: &mut dyn Write) -> Result<u64> {
        let request = Request::Download { file_id, range };
        let header = self
            .transport
            .send_receive_into(&self.endpoint.addr(), &request.encode(), sink)?;
        streamed(file_id, header)
    }

    pub fn delete(&self, file_id: &FileId) -> Result<DeleteReceipt> {
        let reply = self.round_trip(&Request::Delete { file_id })?;
        interpret(Command::DeleteFile, Some(file_id), reply)?.into_empty()?;
        Ok(delete_receipt(self.endpoint, file_id))
    }

    pub fn file_info(&self, file_id: &FileId) -> Result<FileInfo> {
        let reply = self.round_trip(&Request::QueryFileInfo { file_id })?;
        Ok(interpret(Command::QueryFileInfo, Some(file_id), reply)?.into_file_info()?)
    }

    pub fn get_metadata(&self, file_id: &FileId) -> Result<Metadata> {
        let reply = self.round_trip(&Request::GetMetadata { file_id })?;
        Ok(interpret(Command::GetMetadata, Some(file_id), reply)?.into_metadata()?)
    }

    pub fn set_metadata(&self, file_id: &FileId, metadata: &Metadata, mode: MetadataMode) -> Result<()> {
        let request = Request::SetMetadata { file_id, metadata, mode };
        let reply = self.round_trip(&request)?;
        Ok(interpret(Command::SetMetadata, Some(file_id), reply)?.into_empty()?)
    }

    pub fn append(&self, file_id: &FileId, data: &[u8]) -> Result<()> {
        let reply = self.round_trip(&Request::Append { file_id, data })?;
        Ok(interpret(Command::AppendFile, Some(file_id), reply)?.into_empty()?)
    }

    /// Overwrite appender-file bytes starting at `offset`.
    pub fn modify(&self, file_id: &FileId, offset: u64, data: &[u8]) -> Result<()> {
        let reply = self.round_trip(&Request::Modify { file_id, offset, data })?;
        Ok(interpret(Command::ModifyFile, Some(file_id), reply)?.into_empty()?)
    }

    pub fn truncate(&self, file_id: &FileId, size: u64) -> Result<()> {
        let reply = self.round_trip(&Request::Truncate { file_id, size })?;
        Ok(interpret(Command::TruncateFile, Some(file_id), reply)?.into_empty()?)
    }

    fn round_trip(&self, request: &Request<'_>) -> Result<Reply> {
        self.transport
            .send_receive(&self.endpoint.addr(), &request.encode())
    }
}

pub struct AsyncStorageClient<'a, T> {
    transport: &'a T,
    endpoint: &'a StorageEndpoint,
}

impl<'a, T: AsyncTransport> AsyncStorageClient<'a, T> {
    pub fn new(transport: &'a T, endpoint: &'a StorageEndpoint) -> Self {
        Self { transport, endpoint }
    }

    pub async fn upload(&self, data: &[u8], ext: &str) -> Result<UploadResult> {
        self.upload_with(data, ext, false).await
    }

    pub async fn upload_appender(&self, data: &[u8], ext: &str) -> Result<UploadResult> {
        self.upload_with(data, ext, true).await
    }

    async fn upload_with(&self, data: &[u8], ext: &str, appender: bool) -> Result<UploadResult> {
        let request = Request::Upload {
            store_path_index: self.endpoint.store_path_index,
            ext: normalize_extension(ext)?,
            data,
            appender,
        };
        let reply = self.round_trip(&request).await?;
        upload_result(self.endpoint, request.command(), None, data.len(), reply)
    }

    pub async fn upload_slave(
        &self,
        master: &FileId,
        prefix: &str,
        data: &[u8],
        ext: &str,
    ) -> Result<UploadResult> {
        validate_prefix(prefix)?;
        let request = Request::UploadSlave {
            master,
            prefix,
            ext: normalize_extension(ext)?,
            data,
        };
        let reply = self.round_trip(&request).await?;
        upload_result(self.endpoint, request.command(), Some(master), data.len(), reply)
    }

    pub async fn download(&self, file_id: &FileId, range: ByteRange) -> Result<Vec<u8>> {
        let reply = self.round_trip(&Request::Download { file_id, range }).await?;
        Ok(interpret(Command::DownloadFile, Some(file_id), reply)?.into_content()?)
    }

    pub async fn download_into(
        &self,
        file_id: &FileId,
        range: ByteRange,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let request = Request::Download { file_id, range };
        let header = self
            .transport
            .send_receive_into(&self.endpoint.addr(), &request.encode(), sink)
            .await?;
        streamed(file_id, header)
    }

    pub async fn delete(&self, file_id: &FileId) -> Result<DeleteReceipt> {
        let reply = self.round_trip(&Request::Delete { file_id }).await?;
        interpret(Command::DeleteFile, Some(file_id), reply)?.into_empty()?;
        Ok(delete_receipt(self.endpoint, file_id))
    }

    pub async fn file_info(&self, file_id: &FileId) -> Result<FileInfo> {
        let reply = self.round_trip(&Request::QueryFileInfo { file_id }).await?;
        Ok(interpret(Command::QueryFileInfo, Some(file_id), reply)?.into_file_info()?)
    }

    pub async fn get_metadata(&self, file_id: &FileId) -> Result<Metadata> {
        let reply = self.round_trip(&Request::GetMetadata { file_id }).await?;
        Ok(interpret(Command::GetMetadata, Some(file_id), reply)?.into_metadata()?)
    }

    pub async fn set_metadata(
        &self,
        file_id: &FileId,
        metadata: &Metadata,
        mode: MetadataMode,
    ) -> Result<()> {
        let request = Request::SetMetadata { file_id, metadata, mode };
        let reply = self.round_trip(&request).await?;
        Ok(interpret(Command::SetMetadata, Some(file_id), reply)?.into_empty()?)
    }

    pub async fn append(&self, file_id: &FileId, data: &[u8]) -> Result<()> {
        let reply = self.round_trip(&Request::Append { file_id, data }).await?;
        Ok(interpret(Command::AppendFile, Some(file_id), reply)?.into_empty()?)
    }

    pub async fn modify(&self, file_id: &FileId, offset: u64, data: &[u8]) -> Result<()> {
        let reply = self
            .round_trip(&Request::Modify { file_id, offset, data })
            .await?;
        Ok(interpret(Command::ModifyFile, Some(file_id), reply)?.into_empty()?)
    }

    pub async fn truncate(&self, file_id: &FileId, size: u64) -> Result<()> {
        let reply = self.round_trip(&Request::Truncate { file_id, size }).await?;
        Ok(interpret(Command::TruncateFile, Some(file_id), reply)?.into_empty()?)
    }

    async fn round_trip(&self, request: &Request<'_>) -> Result<Reply> {
        self.transport
            .send_receive(&self.endpoint.addr(), &request.encode())
            .await
    }
}

/// Maps a nonzero status to `StorageError`, otherwise decodes the body.
fn interpret(command: Command, file_id: Option<&FileId>, reply: Reply) -> Result<ResponseBody> {
    if !reply.header.is_ok() {
        let target = file_id.map(FileId::to_string);
        warn!(
            "Storage rejected {:?} for '{}' with status {}",
            command,
            target.as_deref().unwrap_or("-"),
            reply.status()
        );
        return Err(StorageError::from_status(command, reply.status(), target.as_deref()).into());
    }
    Ok(decode_body(command, reply.body)?)
}

/// `master` is named in the error when a slave upload finds no master file.
fn upload_result(
    endpoint: &StorageEndpoint,
    command: Command,
    master: Option<&FileId>,
    size: usize,
    reply: Reply,
) -> Result<UploadResult> {
    let file_id = interpret(command, master, reply)?.into_file_id()?;
    info!("Uploaded {} bytes as '{}' on {}", size, file_id, endpoint.host);
    Ok(UploadResult {
        file_id,
        size: size as u64,
        storage_ip: endpoint.host.clone(),
    })
}

fn streamed(file_id: &FileId, header: Header) -> Result<u64> {
    if !header.is_ok() {
        warn!(
            "Storage rejected download of '{}' with status {}",
            file_id, header.status
        );
        return Err(
            StorageError::from_status(Command::DownloadFile, header.status, Some(&file_id.to_string())).into(),
        );
    }
    Ok(header.length)
}

fn delete_receipt(endpoint: &StorageEndpoint, file_id: &FileId) -> DeleteReceipt {
    info!("Deleted '{}' on {}", file_id, endpoint.host);
    DeleteReceipt {
        status: DELETE_STATUS.to_string(),
        file_id: file_id.clone(),
        storage_ip: endpoint.host.clone(),
    }
}
