//! Client for a tracker/storage distributed file store speaking the FastDFS
//! wire protocol.
//!
//! Every operation first asks a tracker which storage node should serve it,
//! then performs the transfer against that node. [`Client`] blocks the calling
//! thread; [`AsyncClient`] runs on tokio. Both put identical frames on the wire.

pub mod async_client;
pub mod client;
pub mod config;
pub mod error;
pub mod file_id;
pub mod protocol;
pub mod storage;
pub mod tracker;
pub mod transport;
pub mod utils;

pub use async_client::AsyncClient;
pub use client::Client;
pub use config::ClientConfig;
pub use error::{
    ConfigError, Error, IdentifierError, Result, StorageError, TrackerError, TransportError,
};
pub use file_id::{FileId, ToFileId};
pub use protocol::{
    ByteRange, FileInfo, FrameError, GroupStat, Metadata, MetadataMode, StorageEndpoint,
    StorageStat,
};
pub use storage::{DeleteReceipt, UploadResult};
pub use transport::{AsyncTransport, ServerAddr, TcpTransport, TokioTransport, Transport};
