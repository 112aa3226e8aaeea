//! Core resource-mounting types.
//!
//! These are the plain data types that cross the bridge boundary: entry
//! descriptors, attribute bits, open parameters. Serde derives let embedders
//! ship them over whatever transport they already have.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Kind of a mounted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Byte-addressable resource.
    File,
    /// Directory-capable resource (mount root, lazy directory, tree root).
    Directory,
}

impl ResourceKind {
    /// Returns true if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, ResourceKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, ResourceKind::Directory)
    }

    /// Attribute bits reported to the driver for this kind.
    pub fn attributes(self) -> FileAttributes {
        match self {
            ResourceKind::File => FILE_ATTRIBUTES,
            ResourceKind::Directory => DIRECTORY_ATTRIBUTES,
        }
    }
}

bitflags! {
    /// NTFS-style file attribute bits, as the driver bridge reports them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 0x0001;
        const DIRECTORY = 0x0010;
        const NORMAL = 0x0080;
        const NOT_CONTENT_INDEXED = 0x2000;
    }
}

/// Attributes reported for file entries.
pub const FILE_ATTRIBUTES: FileAttributes = FileAttributes::NORMAL;

/// Attributes reported for directory entries. The view is read-only and the
/// entries are transient, so content indexing is opted out of.
pub const DIRECTORY_ATTRIBUTES: FileAttributes = FileAttributes::READ_ONLY
    .union(FileAttributes::NOT_CONTENT_INDEXED)
    .union(FileAttributes::DIRECTORY);

impl Serialize for FileAttributes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for FileAttributes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(FileAttributes::from_bits_retain(u32::deserialize(
            deserializer,
        )?))
    }
}

/// Entry descriptor returned by stat and directory enumeration.
///
/// Only the node's creation instant is reliably known, so `created` and
/// `written` both carry it; `accessed` falls back to the backing accessor's
/// last-changed timestamp when one exists. A documented approximation, not
/// a bug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInformation {
    /// Entry name (path segment, not full path).
    pub name: String,
    /// Attribute bits derived from the entry kind.
    pub attributes: FileAttributes,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Node creation time.
    pub created: SystemTime,
    /// Backing accessor's last-changed time, or the creation time.
    pub accessed: SystemTime,
    /// Node creation time.
    pub written: SystemTime,
}

impl FileInformation {
    /// Returns true if the descriptor carries directory attributes.
    pub fn is_dir(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

/// Requested access for `open`.
///
/// Accepted for protocol compatibility and not interpreted further: the
/// mounted view is read-only, and write attempts fail at the write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccess {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
}

impl Default for OpenAccess {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
        }
    }
}

impl OpenAccess {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }
}

/// Requested sharing for `open`. Accepted and not interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareAccess {
    /// Other openers may read.
    pub read: bool,
    /// Other openers may write.
    pub write: bool,
    /// Other openers may delete.
    pub delete: bool,
}

/// Creation disposition for `open`. Accepted and not interpreted; nothing
/// is ever created on the mounted view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreationDisposition {
    /// Open an existing resource.
    #[default]
    Open,
    /// Open, creating if absent.
    OpenAlways,
    /// Create a new resource.
    CreateNew,
    /// Create, replacing if present.
    CreateAlways,
    /// Open and truncate.
    TruncateExisting,
}

/// Free-space report for the mounted volume.
///
/// The virtual drive has no capacity of its own; everything stays zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiskFreeSpace {
    /// Bytes available to the caller.
    pub free_bytes_available: u64,
    /// Total size of the volume.
    pub total_bytes: u64,
    /// Total free bytes on the volume.
    pub total_free_bytes: u64,
}
