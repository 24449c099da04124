//! Wire constants for the tracker/storage protocol

/// Header: 8-byte body length, command, status
pub const HEADER_SIZE: usize = 10;

/// Every integer field on the wire is an 8-byte big-endian value
pub const PKG_LEN_SIZE: usize = 8;

/// Fixed field widths
pub const GROUP_NAME_LEN: usize = 16;
pub const IP_ADDRESS_LEN: usize = 15;
pub const SOURCE_IP_LEN: usize = 16;
pub const EXT_NAME_LEN: usize = 6;
/// Name suffix that tells a slave file apart from its master
pub const PREFIX_NAME_LEN: usize = 16;

/// Tracker reply bodies
pub const STORE_ENDPOINT_BODY_LEN: usize = GROUP_NAME_LEN + IP_ADDRESS_LEN + PKG_LEN_SIZE + 1;
pub const FETCH_ENDPOINT_BODY_LEN: usize = GROUP_NAME_LEN + IP_ADDRESS_LEN + PKG_LEN_SIZE;

/// Storage file-info reply body
pub const FILE_INFO_BODY_LEN: usize = 3 * PKG_LEN_SIZE + SOURCE_IP_LEN;

/// `list groups` record: 17-byte name, then eleven counters
pub const GROUP_STAT_LEN: usize = GROUP_NAME_LEN + 1 + 11 * PKG_LEN_SIZE;

/// `list servers` record (6.x layout)
pub const STORAGE_ID_LEN: usize = 16;
pub const DOMAIN_NAME_LEN: usize = 128;
pub const VERSION_LEN: usize = 6;
pub const STORAGE_STAT_FIELDS: usize = 10;
pub const STORAGE_STAT_COUNTERS: usize = 42;
pub const STORAGE_STAT_LEN: usize = 1
    + STORAGE_ID_LEN
    + SOURCE_IP_LEN
    + DOMAIN_NAME_LEN
    + STORAGE_ID_LEN
    + VERSION_LEN
    + (STORAGE_STAT_FIELDS + STORAGE_STAT_COUNTERS) * PKG_LEN_SIZE
    + 1;

/// Storage node state reported by the tracker for a serving node
pub const STORAGE_STATUS_ACTIVE: u8 = 7;

/// Hard safety limit on a declared body length
pub const MAX_BODY_LEN: u64 = 8 * 1024 * 1024 * 1024; // 8GB

/// Socket read granularity when streaming bodies
pub const READ_CHUNK: usize = 64 * 1024;

pub const DEFAULT_TRACKER_PORT: u16 = 22122;

/// Status codes with a known meaning
pub const STATUS_OK: u8 = 0;
pub const STATUS_NOT_FOUND: u8 = 2; // ENOENT
pub const STATUS_NO_SPACE: u8 = 28; // ENOSPC

/// Metadata buffer separators
pub const RECORD_SEPARATOR: u8 = 0x01;
pub const FIELD_SEPARATOR: u8 = 0x02;
