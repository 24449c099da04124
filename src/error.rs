//! Error taxonomy. Every failure reaches the caller of the facade operation
//! that triggered it; nothing here is retried.

use std::io;
use std::path::PathBuf;

use crate::protocol::constants::{STATUS_NOT_FOUND, STATUS_NO_SPACE};
use crate::protocol::error::FrameError;
use crate::protocol::frame::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Reading a local source or writing a local sink failed
    #[error("local i/o error: {0}")]
    Local(#[source] io::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError::NotFound { .. }) | Error::Tracker(TrackerError::NotFound { .. })
        )
    }
}

/// Connection-level failure: the peer was unreachable or went away.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out talking to {addr}")]
    Timeout { addr: String },
    #[error("i/o error with {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("no tracker configured")]
    NoTracker,
}

impl TransportError {
    pub fn from_io(addr: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout {
                addr: addr.to_string(),
            },
            _ => TransportError::Io {
                addr: addr.to_string(),
                source,
            },
        }
    }
}

/// The tracker answered, negatively.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("tracker has no record for {target} ({command:?})")]
    NotFound { command: Command, target: String },
    #[error("tracker has no storage server available ({command:?})")]
    NoStorageAvailable { command: Command },
    #[error("tracker rejected {command:?} with status {status}")]
    Status { command: Command, status: u8 },
}

impl TrackerError {
    pub fn from_status(command: Command, status: u8, target: &str) -> Self {
        match status {
            STATUS_NOT_FOUND => TrackerError::NotFound {
                command,
                target: target.to_string(),
            },
            STATUS_NO_SPACE => TrackerError::NoStorageAvailable { command },
            _ => TrackerError::Status { command, status },
        }
    }
}

/// The storage node answered, negatively.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("file not found: {file_id}")]
    NotFound { file_id: String },
    #[error("storage rejected {command:?} with status {status}")]
    Status { command: Command, status: u8 },
}

impl StorageError {
    pub fn from_status(command: Command, status: u8, file_id: Option<&str>) -> Self {
        match (status, file_id) {
            (STATUS_NOT_FOUND, Some(file_id)) => StorageError::NotFound {
                file_id: file_id.to_string(),
            },
            _ => StorageError::Status { command, status },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("empty file identifier")]
    Empty,
    #[error("no group segment in '{0}'")]
    MissingGroup(String),
    #[error("no remote path in '{0}'")]
    MissingPath(String),
    #[error("invalid group name '{0}'")]
    InvalidGroup(String),
    #[error("file extension '{0}' longer than 6 bytes")]
    ExtensionTooLong(String),
    #[error("'{0}' starts with a host name; give a full URL with a scheme")]
    MissingScheme(String),
    #[error("slave prefix '{0}' must be 1 to 16 bytes without '/'")]
    InvalidPrefix(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no tracker configured")]
    NoTrackers,
    #[error("invalid tracker address '{0}'")]
    InvalidTracker(String),
    #[error("invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            StorageError::from_status(Command::DownloadFile, 2, Some("group1/x")),
            StorageError::NotFound {
                file_id: "group1/x".into()
            }
        );
        assert_eq!(
            StorageError::from_status(Command::UploadFile, 2, None),
            StorageError::Status {
                command: Command::UploadFile,
                status: 2
            }
        );
        assert_eq!(
            TrackerError::from_status(Command::QueryStoreWithGroup, 28, "group9"),
            TrackerError::NoStorageAvailable {
                command: Command::QueryStoreWithGroup
            }
        );
        assert_eq!(
            TrackerError::from_status(Command::QueryFetchOne, 77, "group1/x"),
            TrackerError::Status {
                command: Command::QueryFetchOne,
                status: 77
            }
        );
    }

    #[test]
    fn timeouts_are_classified() {
        let err = TransportError::from_io("h:1", io::Error::from(io::ErrorKind::WouldBlock));
        assert!(matches!(err, TransportError::Timeout { .. }));
        let err = TransportError::from_io("h:1", io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(err, TransportError::Io { .. }));
    }
}
