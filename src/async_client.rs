//! Cooperative facade. Same operations and wire traffic as [`crate::Client`];
//! each call suspends at socket boundaries instead of blocking a thread, and
//! dropping a call's future closes its connections.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::file_id::{extension_of, FileId, ToFileId};
use crate::protocol::request::{ByteRange, Metadata, MetadataMode};
use crate::protocol::response::{FileInfo, GroupStat, StorageEndpoint, StorageStat};
use crate::storage::{AsyncStorageClient, DeleteReceipt, UploadResult};
use crate::tracker::AsyncTrackerClient;
use crate::transport::{AsyncTransport, ServerAddr, TokioTransport};

/// Cheap to clone; clones share configuration and transport.
pub struct AsyncClient<T = TokioTransport> {
    config: Arc<ClientConfig>,
    trackers: Arc<[ServerAddr]>,
    transport: Arc<T>,
}

impl<T> Clone for AsyncClient<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            trackers: Arc::clone(&self.trackers),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl AsyncClient<TokioTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = TokioTransport::new(config.connect_timeout(), config.network_timeout());
        Self::with_transport(config, transport)
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            config: Arc::clone(&self.config),
            trackers: Arc::clone(&self.trackers),
            transport: Arc::new(TokioTransport::new(self.config.connect_timeout(), timeout)),
        }
    }
}

impl<T: AsyncTransport> AsyncClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        let trackers = config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            trackers: trackers.into(),
            transport: Arc::new(transport),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn tracker(&self) -> AsyncTrackerClient<'_, T> {
        AsyncTrackerClient::new(&*self.transport, &self.trackers)
    }

    fn storage<'a>(&'a self, endpoint: &'a StorageEndpoint) -> AsyncStorageClient<'a, T> {
        AsyncStorageClient::new(&*self.transport, endpoint)
    }

    pub async fn upload(&self, data: &[u8], ext: &str) -> Result<UploadResult> {
        let endpoint = self.tracker().query_store(self.config.group.as_deref()).await?;
        self.storage(&endpoint).upload(data, ext).await
    }

    pub async fn upload_bytes(&self, data: &[u8], ext: &str) -> Result<FileId> {
        Ok(self.upload(data, ext).await?.file_id)
    }

    pub async fn upload_to_group(&self, group: &str, data: &[u8], ext: &str) -> Result<UploadResult> {
        let endpoint = self.tracker().query_store(Some(group)).await?;
        self.storage(&endpoint).upload(data, ext).await
    }

    pub async fn upload_as_url(&self, data: &[u8], ext: &str) -> Result<String> {
        let result = self.upload(data, ext).await?;
        let base = self.config.public_base(&result.storage_ip);
        Ok(result.file_id.format(Some(&base)))
    }

    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<UploadResult> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(Error::Local)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = self.upload(&data, extension_of(&name)).await?;
        info!("Uploaded {:?} as '{}'", path, result.file_id);
        Ok(result)
    }

    pub async fn upload_appender(&self, data: &[u8], ext: &str) -> Result<UploadResult> {
        let endpoint = self.tracker().query_store(self.config.group.as_deref()).await?;
        self.storage(&endpoint).upload_appender(data, ext).await
    }

    pub async fn append(&self, id: impl ToFileId, data: &[u8]) -> Result<()> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id).await?;
        self.storage(&endpoint).append(&file_id, data).await?;
        info!("Appended {} bytes to '{}'", data.len(), file_id);
        Ok(())
    }

    pub async fn modify(&self, id: impl ToFileId, offset: u64, data: &[u8]) -> Result<()> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id).await?;
        self.storage(&endpoint).modify(&file_id, offset, data).await?;
        info!("Modified {} bytes of '{}' at offset {}", data.len(), file_id, offset);
        Ok(())
    }

    pub async fn upload_slave(
        &self,
        master: impl ToFileId,
        prefix: &str,
        data: &[u8],
        ext: &str,
    ) -> Result<UploadResult> {
        let master = master.to_file_id()?;
        let endpoint = self.tracker().query_store(Some(master.group())).await?;
        self.storage(&endpoint)
            .upload_slave(&master, prefix, data, ext)
            .await
    }

    pub async fn upload_slave_file(
        &self,
        master: impl ToFileId,
        prefix: &str,
        path: impl AsRef<Path>,
    ) -> Result<UploadResult> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(Error::Local)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.upload_slave(master, prefix, &data, extension_of(&name))
            .await
    }

    pub async fn truncate(&self, id: impl ToFileId, size: u64) -> Result<()> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id).await?;
        self.storage(&endpoint).truncate(&file_id, size).await?;
        info!("Truncated '{}' to {} bytes", file_id, size);
        Ok(())
    }

    pub async fn download_to_bytes(&self, id: impl ToFileId) -> Result<Vec<u8>> {
        self.download_range(id, 0, 0).await
    }

    pub async fn download_range(&self, id: impl ToFileId, offset: u64, length: u64) -> Result<Vec<u8>> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_fetch(&file_id).await?;
        let data = self
            .storage(&endpoint)
            .download(&file_id, ByteRange::new(offset, length))
            .await?;
        info!("Downloaded {} bytes of '{}'", data.len(), file_id);
        Ok(data)
    }

    pub async fn download_to_sink<W>(&self, id: impl ToFileId, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_fetch(&file_id).await?;
        let size = self
            .storage(&endpoint)
            .download_into(&file_id, ByteRange::default(), sink)
            .await?;
        info!("Downloaded {} bytes of '{}'", size, file_id);
        Ok(size)
    }

    pub async fn download_to_file(&self, id: impl ToFileId, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::create(path).await.map_err(Error::Local)?;
        match self.download_to_sink(id, &mut file).await {
            Ok(size) => Ok(size),
            Err(e) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(path).await {
                    warn!("Could not remove partial download {:?}: {}", path, cleanup);
                }
                Err(e)
            }
        }
    }

    pub async fn delete(&self, id: impl ToFileId) -> Result<DeleteReceipt> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id).await?;
        self.storage(&endpoint).delete(&file_id).await
    }

    pub async fn file_info(&self, id: impl ToFileId) -> Result<FileInfo> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_fetch(&file_id).await?;
        self.storage(&endpoint).file_info(&file_id).await
    }

    pub async fn get_metadata(&self, id: impl ToFileId) -> Result<Metadata> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_fetch(&file_id).await?;
        self.storage(&endpoint).get_metadata(&file_id).await
    }

    pub async fn set_metadata(
        &self,
        id: impl ToFileId,
        metadata: &Metadata,
        mode: MetadataMode,
    ) -> Result<()> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id).await?;
        self.storage(&endpoint)
            .set_metadata(&file_id, metadata, mode)
            .await?;
        info!("Stored {} metadata entries on '{}' ({:?})", metadata.len(), file_id, mode);
        Ok(())
    }

    pub async fn list_all_groups(&self) -> Result<Vec<GroupStat>> {
        self.tracker().list_all_groups().await
    }

    pub async fn list_one_group(&self, group: &str) -> Result<GroupStat> {
        self.tracker().list_one_group(group).await
    }

    pub async fn list_servers(
        &self,
        group: &str,
        storage_ip: Option<&str>,
    ) -> Result<Vec<StorageStat>> {
        self.tracker().list_servers(group, storage_ip).await
    }

    pub async fn active_test(&self) -> Result<bool> {
        self.tracker().active_test().await
    }
}
