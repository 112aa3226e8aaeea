//! Local-filesystem resource accessors.
//!
//! Wraps a real path so on-disk media can be projected under a mount root.
//! Metadata is captured at construction time; the mounted view works from
//! that snapshot, matching the once-only contract of lazy directory
//! expansion.

use async_trait::async_trait;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::accessor::{ResourceAccessor, ResourceStream};
use crate::error::{MountError, MountResult};

/// Resource accessor over a local filesystem path.
pub struct LocalResource {
    path: PathBuf,
    name: String,
    is_dir: bool,
    size: u64,
    changed: SystemTime,
}

impl LocalResource {
    /// Wrap a real filesystem path.
    ///
    /// The path is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(path: impl Into<PathBuf>) -> MountResult<Self> {
        let path: PathBuf = path.into();
        let path = path.canonicalize().unwrap_or(path);
        let meta = std::fs::metadata(&path).map_err(MountError::from)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_parts(path, name, &meta))
    }

    fn from_parts(path: PathBuf, name: String, meta: &std::fs::Metadata) -> Self {
        Self {
            path,
            name,
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            changed: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    /// The wrapped path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn children(&self, directories: bool) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        if !self.is_dir {
            return Err(MountError::not_a_directory(self.name.clone()));
        }
        let mut out: Vec<Arc<dyn ResourceAccessor>> = Vec::new();
        let mut dir = fs::read_dir(&self.path).await.map_err(MountError::from)?;
        while let Some(entry) = dir.next_entry().await.map_err(MountError::from)? {
            let meta = entry.metadata().await.map_err(MountError::from)?;
            if meta.is_dir() != directories {
                continue;
            }
            out.push(Arc::new(Self::from_parts(
                entry.path(),
                entry.file_name().to_string_lossy().into_owned(),
                &meta,
            )));
        }
        Ok(out)
    }
}

#[async_trait]
impl ResourceAccessor for LocalResource {
    fn resource_name(&self) -> String {
        self.name.clone()
    }

    fn is_directory(&self) -> bool {
        self.is_dir
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn last_changed(&self) -> SystemTime {
        self.changed
    }

    async fn open_read(&self) -> MountResult<Box<dyn ResourceStream>> {
        if self.is_dir {
            return Err(MountError::accessor_unavailable(self.name.clone()));
        }
        let file = fs::File::open(&self.path).await.map_err(MountError::from)?;
        Ok(Box::new(LocalStream { file }))
    }

    async fn child_directories(&self) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        self.children(true).await
    }

    async fn files(&self) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        self.children(false).await
    }
}

struct LocalStream {
    file: fs::File,
}

#[async_trait]
impl ResourceStream for LocalStream {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        // Fill the buffer; a single read may return short of end-of-file.
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}
