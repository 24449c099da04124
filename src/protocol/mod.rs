pub mod constants;
pub mod error;
pub mod frame;
pub mod request;
pub mod response;

pub use constants::*;
pub use error::FrameError;
pub use frame::{encode_frame, Command, Header, OutboundFrame, Reply};
pub use request::{ByteRange, Metadata, MetadataMode, Request};
pub use response::{decode_body, FileInfo, GroupStat, ResponseBody, StorageEndpoint, StorageStat};
