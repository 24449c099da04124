//! Blocking facade: ask a tracker where to go, then talk to that storage node.
//!
//! Every call runs on the calling thread and opens its own connections, so a
//! `Client` can be shared freely across threads.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::file_id::{extension_of, FileId, ToFileId};
use crate::protocol::request::{ByteRange, Metadata, MetadataMode};
use crate::protocol::response::{FileInfo, GroupStat, StorageStat};
use crate::storage::{DeleteReceipt, StorageClient, UploadResult};
use crate::tracker::TrackerClient;
use crate::transport::{ServerAddr, TcpTransport, Transport};

pub struct Client<T = TcpTransport> {
    config: ClientConfig,
    trackers: Vec<ServerAddr>,
    transport: T,
}

impl Client<TcpTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = TcpTransport::new(config.connect_timeout(), config.network_timeout());
        Self::with_transport(config, transport)
    }

    /// Same configuration, different per-step network timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            config: self.config.clone(),
            trackers: self.trackers.clone(),
            transport: TcpTransport::new(self.config.connect_timeout(), timeout),
        }
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        let trackers = config.validate()?;
        Ok(Self {
            config,
            trackers,
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn tracker(&self) -> TrackerClient<'_, T> {
        TrackerClient::new(&self.transport, &self.trackers)
    }

    /// Upload into the configured group, or wherever the tracker chooses.
    pub fn upload(&self, data: &[u8], ext: &str) -> Result<UploadResult> {
        let endpoint = self.tracker().query_store(self.config.group.as_deref())?;
        StorageClient::new(&self.transport, &endpoint).upload(data, ext)
    }

    pub fn upload_bytes(&self, data: &[u8], ext: &str) -> Result<FileId> {
        Ok(self.upload(data, ext)?.file_id)
    }

    pub fn upload_to_group(&self, group: &str, data: &[u8], ext: &str) -> Result<UploadResult> {
        let endpoint = self.tracker().query_store(Some(group))?;
        StorageClient::new(&self.transport, &endpoint).upload(data, ext)
    }

    /// Upload, then return the public URL of the new file.
    pub fn upload_as_url(&self, data: &[u8], ext: &str) -> Result<String> {
        let result = self.upload(data, ext)?;
        let base = self.config.public_base(&result.storage_ip);
        Ok(result.file_id.format(Some(&base)))
    }

    /// Upload a local file; the extension comes from its name.
    pub fn upload_file(&self, path: impl AsRef<Path>) -> Result<UploadResult> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(Error::Local)?;
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let result = self.upload(&data, extension_of(&name))?;
        info!("Uploaded {:?} as '{}'", path, result.file_id);
        Ok(result)
    }

    pub fn upload_appender(&self, data: &[u8], ext: &str) -> Result<UploadResult> {
        let endpoint = self.tracker().query_store(self.config.group.as_deref())?;
        StorageClient::new(&self.transport, &endpoint).upload_appender(data, ext)
    }

    pub fn append(&self, id: impl ToFileId, data: &[u8]) -> Result<()> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id)?;
        StorageClient::new(&self.transport, &endpoint).append(&file_id, data)?;
        info!("Appended {} bytes to '{}'", data.len(), file_id);
        Ok(())
    }

    /// Overwrite bytes of an appender file in place, starting at `offset`.
    pub fn modify(&self, id: impl ToFileId, offset: u64, data: &[u8]) -> Result<()> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id)?;
        StorageClient::new(&self.transport, &endpoint).modify(&file_id, offset, data)?;
        info!("Modified {} bytes of '{}' at offset {}", data.len(), file_id, offset);
        Ok(())
    }

    /// Upload `data` as a slave of `master` (a thumbnail next to its image,
    /// say), in the master's group.
    pub fn upload_slave(&self, master: impl ToFileId, prefix: &str, data: &[u8], ext: &str) -> Result<UploadResult> {
        let master = master.to_file_id()?;
        let endpoint = self.tracker().query_store(Some(master.group()))?;
        StorageClient::new(&self.transport, &endpoint).upload_slave(&master, prefix, data, ext)
    }

    pub fn upload_slave_file(&self, master: impl ToFileId, prefix: &str, path: impl AsRef<Path>) -> Result<UploadResult> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(Error::Local)?;
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        self.upload_slave(master, prefix, &data, extension_of(&name))
    }

    pub fn truncate(&self, id: impl ToFileId, size: u64) -> Result<()> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id)?;
        StorageClient::new(&self.transport, &endpoint).truncate(&file_id, size)?;
        info!("Truncated '{}' to {} bytes", file_id, size);
        Ok(())
    }

    pub fn download_to_bytes(&self, id: impl ToFileId) -> Result<Vec<u8>> {
        self.download_range(id, 0, 0)
    }

    /// `length == 0` reads through to the end of the file.
    pub fn download_range(&self, id: impl ToFileId, offset: u64, length: u64) -> Result<Vec<u8>> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_fetch(&file_id)?;
        let data = StorageClient::new(&self.transport, &endpoint)
            .download(&file_id, ByteRange::new(offset, length))?;
        info!("Downloaded {} bytes of '{}'", data.len(), file_id);
        Ok(data)
    }

    /// Streams the file into `sink` without buffering it; returns the byte count.
    pub fn download_to_sink(&self, id: impl ToFileId, sink: &mut dyn Write) -> Result<u64> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_fetch(&file_id)?;
        let size = StorageClient::new(&self.transport, &endpoint)
            .download_into(&file_id, ByteRange::default(), sink)?;
        info!("Downloaded {} bytes of '{}'", size, file_id);
        Ok(size)
    }

    /// Streams into a local file. A failed download leaves no file behind.
    pub fn download_to_file(&self, id: impl ToFileId, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let mut file = File::create(path).map_err(Error::Local)?;
        match self.download_to_sink(id, &mut file) {
            Ok(size) => Ok(size),
            Err(e) => {
                drop(file);
                if let Err(cleanup) = std::fs::remove_file(path) {
                    warn!("Could not remove partial download {:?}: {}", path, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Accepts a bare identifier or a public URL.
    pub fn delete(&self, id: impl ToFileId) -> Result<DeleteReceipt> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id)?;
        StorageClient::new(&self.transport, &endpoint).delete(&file_id)
    }

    pub fn file_info(&self, id: impl ToFileId) -> Result<FileInfo> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_fetch(&file_id)?;
        StorageClient::new(&self.transport, &endpoint).file_info(&file_id)
    }

    pub fn get_metadata(&self, id: impl ToFileId) -> Result<Metadata> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_fetch(&file_id)?;
        StorageClient::new(&self.transport, &endpoint).get_metadata(&file_id)
    }

    pub fn set_metadata(&self, id: impl ToFileId, metadata: &Metadata, mode: MetadataMode) -> Result<()> {
        let file_id = id.to_file_id()?;
        let endpoint = self.tracker().query_update(&file_id)?;
        StorageClient::new(&self.transport, &endpoint).set_metadata(&file_id, metadata, mode)?;
        info!("Stored {} metadata entries on '{}' ({:?})", metadata.len(), file_id, mode);
        Ok(())
    }

    pub fn list_all_groups(&self) -> Result<Vec<GroupStat>> {
        self.tracker().list_all_groups()
    }

    pub fn list_one_group(&self, group: &str) -> Result<GroupStat> {
        self.tracker().list_one_group(group)
    }

    pub fn list_servers(&self, group: &str, storage_ip: Option<&str>) -> Result<Vec<StorageStat>> {
        self.tracker().list_servers(group, storage_ip)
    }

    /// Probes one of the configured trackers.
    pub fn active_test(&self) -> Result<bool> {
        self.tracker().active_test()
    }
}
