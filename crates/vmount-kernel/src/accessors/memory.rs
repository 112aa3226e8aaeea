//! In-memory resource accessors.
//!
//! Used by tests and by embedders that want to project synthesized content
//! (generated playlists, archive indexes) without touching a disk. All data
//! is ephemeral.

use async_trait::async_trait;
use std::io;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::accessor::{ResourceAccessor, ResourceStream};
use crate::error::{MountError, MountResult};

enum Content {
    File(Arc<Vec<u8>>),
    Directory(RwLock<Vec<Arc<dyn ResourceAccessor>>>),
}

/// In-memory resource accessor.
pub struct MemoryResource {
    name: String,
    changed: SystemTime,
    content: Content,
}

impl MemoryResource {
    /// Create a file resource over the given bytes.
    pub fn file(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            changed: SystemTime::now(),
            content: Content::File(Arc::new(data.into())),
        }
    }

    /// Create an empty directory resource.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changed: SystemTime::now(),
            content: Content::Directory(RwLock::new(Vec::new())),
        }
    }

    /// Append a child accessor. Files ignore this.
    ///
    /// Note that a mounted lazy directory caches its children on first
    /// enumeration; children added here afterwards are not reflected in the
    /// mounted view until the directory is remounted.
    pub fn add_child(&self, child: Arc<dyn ResourceAccessor>) {
        if let Content::Directory(children) = &self.content {
            if let Ok(mut children) = children.write() {
                children.push(child);
            }
        }
    }

    fn children(&self, directories: bool) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        match &self.content {
            Content::File(_) => Err(MountError::not_a_directory(self.name.clone())),
            Content::Directory(children) => {
                let children = children
                    .read()
                    .map_err(|_| MountError::accessor_unavailable("child list lock poisoned"))?;
                Ok(children
                    .iter()
                    .filter(|child| child.is_directory() == directories)
                    .cloned()
                    .collect())
            }
        }
    }
}

#[async_trait]
impl ResourceAccessor for MemoryResource {
    fn resource_name(&self) -> String {
        self.name.clone()
    }

    fn is_directory(&self) -> bool {
        matches!(self.content, Content::Directory(_))
    }

    fn size(&self) -> u64 {
        match &self.content {
            Content::File(data) => data.len() as u64,
            Content::Directory(_) => 0,
        }
    }

    fn last_changed(&self) -> SystemTime {
        self.changed
    }

    async fn open_read(&self) -> MountResult<Box<dyn ResourceStream>> {
        match &self.content {
            Content::File(data) => Ok(Box::new(MemoryStream { data: data.clone() })),
            Content::Directory(_) => Err(MountError::accessor_unavailable(self.name.clone())),
        }
    }

    async fn child_directories(&self) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        self.children(true)
    }

    async fn files(&self) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        self.children(false)
    }
}

struct MemoryStream {
    data: Arc<Vec<u8>>,
}

#[async_trait]
impl ResourceStream for MemoryStream {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = (offset as usize).min(self.data.len());
        let end = (start + buf.len()).min(self.data.len());
        let count = end - start;
        buf[..count].copy_from_slice(&self.data[start..end]);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_read_clamps() {
        let file = MemoryResource::file("a.bin", vec![9u8; 100]);
        assert_eq!(file.size(), 100);
        assert!(!file.is_directory());

        let mut stream = file.open_read().await.unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(stream.read_at(0, &mut buf).await.unwrap(), 64);
        assert_eq!(stream.read_at(64, &mut buf).await.unwrap(), 36);
        assert_eq!(stream.read_at(200, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_directory_partitions_children() {
        let dir = MemoryResource::directory("clips");
        dir.add_child(Arc::new(MemoryResource::file("a.ts", b"x".to_vec())));
        dir.add_child(Arc::new(MemoryResource::directory("sub")));

        let files = dir.files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].resource_name(), "a.ts");

        let dirs = dir.child_directories().await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].resource_name(), "sub");
    }

    #[tokio::test]
    async fn test_file_has_no_children() {
        let file = MemoryResource::file("a.ts", b"x".to_vec());
        assert!(matches!(
            file.files().await,
            Err(MountError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_has_no_stream() {
        let dir = MemoryResource::directory("clips");
        assert!(matches!(
            dir.open_read().await,
            Err(MountError::AccessorUnavailable(_))
        ));
    }
}
