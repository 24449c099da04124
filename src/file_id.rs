//! Remote file identifiers: `group/path`, or a URL whose path is `group/path`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;
use crate::protocol::constants::{EXT_NAME_LEN, GROUP_NAME_LEN, PREFIX_NAME_LEN};

/// Group name plus remote path of a stored file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    group: String,
    path: String,
}

impl FileId {
    pub fn new(group: impl Into<String>, path: impl Into<String>) -> Result<Self, IdentifierError> {
        let group = group.into();
        let path = path.into();
        validate_group(&group)?;
        if path.is_empty() {
            return Err(IdentifierError::MissingPath(format!("{}/", group)));
        }
        Ok(Self { group, path })
    }

    /// Accepts `group/path`, `/group/path`, or `scheme://host[:port]/group/path`.
    /// The host of a URL names where the file is published, not where it is
    /// stored, so it is dropped. A host without a scheme
    /// (`cdn.example.com/group1/M00/...`) is rejected rather than read as a
    /// group.
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(IdentifierError::Empty);
        }

        let rest = match text.find("://") {
            Some(pos) => {
                let after_scheme = &text[pos + 3..];
                let path = match after_scheme.find('/') {
                    Some(slash) => &after_scheme[slash + 1..],
                    None => return Err(IdentifierError::MissingGroup(text.to_string())),
                };
                path.split(|c: char| c == '?' || c == '#').next().unwrap_or_default()
            }
            None => text.trim_start_matches('/'),
        };

        let Some((group, path)) = rest.split_once('/') else {
            return Err(IdentifierError::MissingGroup(text.to_string()));
        };
        if group.is_empty() {
            return Err(IdentifierError::MissingGroup(text.to_string()));
        }
        if !text.contains("://") && looks_like_host(group, path) {
            return Err(IdentifierError::MissingScheme(text.to_string()));
        }
        validate_group(group)?;
        if path.is_empty() {
            return Err(IdentifierError::MissingPath(text.to_string()));
        }

        Ok(Self {
            group: group.to_string(),
            path: path.to_string(),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bare `group/path`, or a full URL under `base_url`. A base without a
    /// scheme is treated as plain http.
    pub fn format(&self, base_url: Option<&str>) -> String {
        match base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                if base.contains("://") {
                    format!("{}/{}", base, self)
                } else {
                    format!("http://{}/{}", base, self)
                }
            }
            None => self.to_string(),
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.path)
    }
}

impl FromStr for FileId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Anything a facade operation accepts as a file address.
pub trait ToFileId {
    fn to_file_id(&self) -> Result<FileId, IdentifierError>;
}

impl ToFileId for FileId {
    fn to_file_id(&self) -> Result<FileId, IdentifierError> {
        Ok(self.clone())
    }
}

impl ToFileId for str {
    fn to_file_id(&self) -> Result<FileId, IdentifierError> {
        FileId::parse(self)
    }
}

impl ToFileId for String {
    fn to_file_id(&self) -> Result<FileId, IdentifierError> {
        FileId::parse(self)
    }
}

impl<T: ToFileId + ?Sized> ToFileId for &T {
    fn to_file_id(&self) -> Result<FileId, IdentifierError> {
        (**self).to_file_id()
    }
}

/// `M00`..`M99`, the store-path segment every remote path starts with
fn is_store_path(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 3 && bytes[0] == b'M' && bytes[1..].iter().all(u8::is_ascii_digit)
}

/// A dotted or ported first segment is a host, and so is any first segment
/// followed by `group/Mnn/...` instead of `Mnn/...`.
fn looks_like_host(first: &str, rest: &str) -> bool {
    if first.contains(|c: char| c == '.' || c == ':') {
        return true;
    }
    let mut segments = rest.split('/');
    let next = segments.next().unwrap_or_default();
    !is_store_path(next) && segments.next().is_some_and(is_store_path)
}

/// The path part of a base URL (empty for `https://host` or `host/`)
pub(crate) fn base_path(base: &str) -> &str {
    let after_scheme = base.find("://").map_or(base, |pos| &base[pos + 3..]);
    after_scheme
        .find('/')
        .map_or("", |slash| &after_scheme[slash..])
        .trim_matches('/')
}

pub fn validate_group(group: &str) -> Result<(), IdentifierError> {
    if group.is_empty() {
        return Err(IdentifierError::MissingGroup(group.to_string()));
    }
    if group.len() > GROUP_NAME_LEN || group.contains(char::is_whitespace) {
        return Err(IdentifierError::InvalidGroup(group.to_string()));
    }
    Ok(())
}

/// Slave prefixes are spliced into a remote file name.
pub fn validate_prefix(prefix: &str) -> Result<(), IdentifierError> {
    if prefix.is_empty() || prefix.len() > PREFIX_NAME_LEN || prefix.contains('/') {
        return Err(IdentifierError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Strips a leading '.' and checks the wire width.
pub fn normalize_extension(ext: &str) -> Result<&str, IdentifierError> {
    let ext = ext.trim_start_matches('.');
    if ext.len() > EXT_NAME_LEN {
        return Err(IdentifierError::ExtensionTooLong(ext.to_string()));
    }
    Ok(ext)
}

/// Extension for a local file name; keeps a double extension such as
/// `tar.gz` when it still fits the wire field.
pub fn extension_of(file_name: &str) -> &str {
    let name = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);
    let mut parts = name.rsplitn(3, '.');
    let last = parts.next().unwrap_or_default();
    let Some(second) = parts.next() else {
        return "";
    };
    if parts.next().is_some_and(|stem| !stem.is_empty()) && !second.is_empty() {
        let double = &name[name.len() - last.len() - second.len() - 1..];
        if double.len() <= EXT_NAME_LEN {
            return double;
        }
    }
    if last.len() <= EXT_NAME_LEN {
        last
    } else {
        ""
    }
}
