//! Resource accessor contract.
//!
//! Accessors are supplied and owned by the hosting application; the mounting
//! core holds shared references and shadows them under stable path names.
//! File-capable accessors answer `size`/`last_changed`/`open_read`;
//! directory-capable accessors additionally enumerate children. The core
//! never writes through an accessor: the mounted view is a read-only
//! projection of live application resources.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{MountError, MountResult};

/// A byte stream opened from a resource accessor.
///
/// Reads are positioned (seek-then-read semantics). A short count is
/// returned only at end of stream.
#[async_trait]
pub trait ResourceStream: Send {
    /// Read up to `buf.len()` bytes starting at `offset`.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// Abstraction over a byte-addressable or enumerable data source.
#[async_trait]
pub trait ResourceAccessor: Send + Sync {
    /// Name of the resource; becomes its path segment under the mount root.
    fn resource_name(&self) -> String;

    /// True if this accessor can enumerate children.
    fn is_directory(&self) -> bool;

    /// Size in bytes (0 for directories).
    fn size(&self) -> u64;

    /// Last-change timestamp of the underlying resource.
    fn last_changed(&self) -> SystemTime;

    /// Open the resource for reading.
    async fn open_read(&self) -> MountResult<Box<dyn ResourceStream>>;

    /// Child directory accessors. Directory-capable accessors only.
    async fn child_directories(&self) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        Err(MountError::not_a_directory(self.resource_name()))
    }

    /// Child file accessors. Directory-capable accessors only.
    async fn files(&self) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        Err(MountError::not_a_directory(self.resource_name()))
    }
}
