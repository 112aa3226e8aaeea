//! Filesystem protocol adapter.
//!
//! The callback surface the OS's user-mode-filesystem bridge dispatches
//! into, implemented on [`ResourceMountingService`]. Only the read-only
//! subset does real work; every mutating call fails with
//! [`MountError::Unsupported`]: the mounted view is a read-only projection
//! of live application resources, never a writable store.

use async_trait::async_trait;
use std::time::SystemTime;
use tracing::debug;

use crate::error::{MountError, MountResult};
use crate::handle::HandleId;
use crate::service::{ResourceMountingService, dispose_all, drain_slots};
use crate::tree::{Node, Resolved};
use crate::types::{
    CreationDisposition, DiskFreeSpace, FileAttributes, FileInformation, OpenAccess, ResourceKind,
    ShareAccess,
};

/// Result of a successful `open`: the handle token plus the directory flag
/// the driver needs to set on the session.
#[derive(Debug, Clone, Copy)]
pub struct OpenedFile {
    pub handle: HandleId,
    pub is_directory: bool,
}

/// The filesystem-driver callback contract.
///
/// Per-handle state machine: `Created → Opened → (Cleanup) → Closed`; a
/// closed handle token is never reused. The bridge is assumed to serialize
/// calls against one handle; calls on independent handles are unordered.
#[async_trait]
pub trait FilesystemHandler: Send + Sync {
    /// Open the resource at `path`. Access, share, and disposition
    /// parameters are accepted for protocol compatibility and not
    /// interpreted.
    async fn open(
        &self,
        path: &str,
        access: OpenAccess,
        share: ShareAccess,
        disposition: CreationDisposition,
    ) -> MountResult<OpenedFile>;

    /// Open the directory at `path`; rejects non-directory targets.
    async fn open_directory(&self, path: &str) -> MountResult<HandleId>;

    /// Always fails: the view is read-only.
    async fn create_directory(&self, path: &str) -> MountResult<()>;

    /// Release the handle's open stream, keeping its tree association
    /// until [`FilesystemHandler::close`].
    async fn cleanup(&self, handle: HandleId) -> MountResult<()>;

    /// Detach the handle from its node and discard it.
    async fn close(&self, handle: HandleId) -> MountResult<()>;

    /// Positioned read. Lazily opens the backing stream on first use; the
    /// read itself happens outside the tree lock. Returns the byte count,
    /// which is short only at end of stream.
    async fn read(&self, handle: HandleId, offset: u64, buf: &mut [u8]) -> MountResult<usize>;

    /// Always fails: the view is read-only.
    async fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> MountResult<usize>;

    /// Always fails: the view is read-only.
    async fn flush(&self, handle: HandleId) -> MountResult<()>;

    /// Attributes, size, and timestamps for the handle's node.
    async fn file_information(&self, handle: HandleId) -> MountResult<FileInformation>;

    /// One descriptor per current child of a directory handle. A snapshot,
    /// not a live cursor: a fresh call re-reads the current children.
    async fn find_files(&self, handle: HandleId) -> MountResult<Vec<FileInformation>>;

    /// Always fails: the view is read-only.
    async fn set_attributes(&self, path: &str, attributes: FileAttributes) -> MountResult<()>;

    /// Always fails: the view is read-only.
    async fn set_file_time(
        &self,
        path: &str,
        created: Option<SystemTime>,
        accessed: Option<SystemTime>,
        written: Option<SystemTime>,
    ) -> MountResult<()>;

    /// Always fails: the view is read-only.
    async fn delete_file(&self, path: &str) -> MountResult<()>;

    /// Always fails: the view is read-only.
    async fn delete_directory(&self, path: &str) -> MountResult<()>;

    /// Always fails: the view is read-only.
    async fn move_file(&self, path: &str, new_path: &str, replace: bool) -> MountResult<()>;

    /// Always fails: the view is read-only.
    async fn set_end_of_file(&self, path: &str, length: u64) -> MountResult<()>;

    /// Always fails: the view is read-only.
    async fn set_allocation_size(&self, path: &str, length: u64) -> MountResult<()>;

    /// Accepted no-op: the read-only view has no writers to exclude.
    async fn lock_file(&self, handle: HandleId, offset: u64, length: u64) -> MountResult<()>;

    /// Accepted no-op.
    async fn unlock_file(&self, handle: HandleId, offset: u64, length: u64) -> MountResult<()>;

    /// Free-space report; the virtual volume reports zero/unknown.
    async fn disk_free_space(&self) -> MountResult<DiskFreeSpace>;

    /// Invoked by the OS on shutdown or forced unmount: releases every
    /// outstanding session and disposes all mount roots.
    async fn unmount(&self) -> MountResult<()>;
}

fn node_kind(node: &Node) -> ResourceKind {
    if node.is_directory() {
        ResourceKind::Directory
    } else {
        ResourceKind::File
    }
}

/// Build the stat descriptor for a node. All timestamps degrade to the
/// node's creation time where the true value is unknowable.
fn file_information_for(node: &Node) -> FileInformation {
    let kind = node_kind(node);
    let accessor = node.accessor();
    FileInformation {
        name: node.name.clone(),
        attributes: kind.attributes(),
        size: match kind {
            ResourceKind::File => accessor.map(|a| a.size()).unwrap_or(0),
            ResourceKind::Directory => 0,
        },
        created: node.created,
        accessed: accessor
            .map(|a| a.last_changed())
            .unwrap_or(node.created),
        written: node.created,
    }
}

#[async_trait]
impl FilesystemHandler for ResourceMountingService {
    async fn open(
        &self,
        path: &str,
        _access: OpenAccess,
        _share: ShareAccess,
        _disposition: CreationDisposition,
    ) -> MountResult<OpenedFile> {
        let mut state = self.state.lock().await;
        let resolved = state.tree.resolve(path).await?;
        let node_id = match resolved {
            Resolved::Node(id) => id,
            Resolved::MissingLeaf => return Err(MountError::file_not_found(path)),
            Resolved::MissingPath => return Err(MountError::path_not_found(path)),
        };
        let is_directory = state
            .tree
            .node(node_id)
            .map(Node::is_directory)
            .unwrap_or(false);
        let (handle, _) = state.handles.insert(node_id, is_directory);
        if let Some(node) = state.tree.node_mut(node_id) {
            node.handles.insert(handle);
        }
        debug!(path, ?handle, is_directory, "opened");
        Ok(OpenedFile {
            handle,
            is_directory,
        })
    }

    async fn open_directory(&self, path: &str) -> MountResult<HandleId> {
        let mut state = self.state.lock().await;
        let resolved = state.tree.resolve(path).await?;
        let node_id = match resolved {
            Resolved::Node(id) if state.tree.node(id).is_some_and(Node::is_directory) => id,
            _ => return Err(MountError::path_not_found(path)),
        };
        let (handle, _) = state.handles.insert(node_id, true);
        if let Some(node) = state.tree.node_mut(node_id) {
            node.handles.insert(handle);
        }
        debug!(path, ?handle, "opened directory");
        Ok(handle)
    }

    async fn create_directory(&self, _path: &str) -> MountResult<()> {
        Err(MountError::Unsupported("create_directory"))
    }

    async fn cleanup(&self, handle: HandleId) -> MountResult<()> {
        let slot = {
            let state = self.state.lock().await;
            match state.handles.get(handle) {
                Some(entry) => entry.slot.clone(),
                // The bridge may clean up sessions it never fully opened.
                None => return Ok(()),
            }
        };
        slot.release().await;
        Ok(())
    }

    async fn close(&self, handle: HandleId) -> MountResult<()> {
        let slot = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.handles.remove(handle) else {
                return Ok(());
            };
            if let Some(node) = state.tree.node_mut(entry.node) {
                node.handles.remove(&handle);
            }
            entry.slot
        };
        slot.release().await;
        debug!(?handle, "closed");
        Ok(())
    }

    async fn read(&self, handle: HandleId, offset: u64, buf: &mut [u8]) -> MountResult<usize> {
        let (slot, accessor) = {
            let state = self.state.lock().await;
            let entry = state.handles.get(handle).ok_or(MountError::InvalidHandle)?;
            let accessor = state
                .tree
                .node(entry.node)
                .and_then(|node| node.accessor().cloned());
            (entry.slot.clone(), accessor)
        };
        // The actual byte I/O happens with no tree lock held, so one slow
        // read cannot stall tree mutations or reads on other handles.
        slot.read_at(accessor, offset, buf).await
    }

    async fn write(&self, _handle: HandleId, _offset: u64, _data: &[u8]) -> MountResult<usize> {
        Err(MountError::Unsupported("write"))
    }

    async fn flush(&self, _handle: HandleId) -> MountResult<()> {
        Err(MountError::Unsupported("flush"))
    }

    async fn file_information(&self, handle: HandleId) -> MountResult<FileInformation> {
        let state = self.state.lock().await;
        let entry = state.handles.get(handle).ok_or(MountError::InvalidHandle)?;
        let node = state.tree.node(entry.node).ok_or(MountError::HandleClosed)?;
        Ok(file_information_for(node))
    }

    async fn find_files(&self, handle: HandleId) -> MountResult<Vec<FileInformation>> {
        let mut state = self.state.lock().await;
        let entry = state.handles.get(handle).ok_or(MountError::InvalidHandle)?;
        if !entry.is_directory {
            let name = state
                .tree
                .node(entry.node)
                .map(|node| node.name.clone())
                .unwrap_or_default();
            return Err(MountError::not_a_directory(name));
        }
        let node_id = entry.node;
        let ids = state.tree.child_ids(node_id).await?;
        let mut entries: Vec<FileInformation> = ids
            .into_iter()
            .filter_map(|id| state.tree.node(id).map(file_information_for))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn set_attributes(&self, _path: &str, _attributes: FileAttributes) -> MountResult<()> {
        Err(MountError::Unsupported("set_attributes"))
    }

    async fn set_file_time(
        &self,
        _path: &str,
        _created: Option<SystemTime>,
        _accessed: Option<SystemTime>,
        _written: Option<SystemTime>,
    ) -> MountResult<()> {
        Err(MountError::Unsupported("set_file_time"))
    }

    async fn delete_file(&self, _path: &str) -> MountResult<()> {
        Err(MountError::Unsupported("delete_file"))
    }

    async fn delete_directory(&self, _path: &str) -> MountResult<()> {
        Err(MountError::Unsupported("delete_directory"))
    }

    async fn move_file(&self, _path: &str, _new_path: &str, _replace: bool) -> MountResult<()> {
        Err(MountError::Unsupported("move_file"))
    }

    async fn set_end_of_file(&self, _path: &str, _length: u64) -> MountResult<()> {
        Err(MountError::Unsupported("set_end_of_file"))
    }

    async fn set_allocation_size(&self, _path: &str, _length: u64) -> MountResult<()> {
        Err(MountError::Unsupported("set_allocation_size"))
    }

    async fn lock_file(&self, _handle: HandleId, _offset: u64, _length: u64) -> MountResult<()> {
        Ok(())
    }

    async fn unlock_file(&self, _handle: HandleId, _offset: u64, _length: u64) -> MountResult<()> {
        Ok(())
    }

    async fn disk_free_space(&self) -> MountResult<DiskFreeSpace> {
        Ok(DiskFreeSpace::default())
    }

    async fn unmount(&self) -> MountResult<()> {
        let slots = {
            let mut state = self.state.lock().await;
            dispose_all(&mut state)
        };
        drain_slots(slots).await;
        debug!("unmounted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::ResourceAccessor;
    use crate::accessors::MemoryResource;
    use crate::config::MountConfig;
    use crate::types::{DIRECTORY_ATTRIBUTES, FILE_ATTRIBUTES};
    use std::sync::Arc;

    fn service() -> ResourceMountingService {
        ResourceMountingService::new(MountConfig::default())
    }

    fn file(name: &str, size: usize) -> Arc<dyn ResourceAccessor> {
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        Arc::new(MemoryResource::file(name, data))
    }

    async fn open(service: &ResourceMountingService, path: &str) -> MountResult<OpenedFile> {
        service
            .open(
                path,
                OpenAccess::read(),
                ShareAccess::default(),
                CreationDisposition::Open,
            )
            .await
    }

    #[tokio::test]
    async fn test_open_read_stat_scenario() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service
            .add_resource("Share1", file("movie.ts", 1024))
            .await
            .unwrap();

        let opened = open(&service, "\\Share1\\movie.ts").await.unwrap();
        assert!(!opened.is_directory);

        let mut buf = vec![0u8; 512];
        let n = service.read(opened.handle, 0, &mut buf).await.unwrap();
        assert_eq!(n, 512);
        assert_eq!(buf[0], 0);

        // Clamped to the remaining size.
        let mut buf = vec![0u8; 1024];
        let n = service.read(opened.handle, 512, &mut buf).await.unwrap();
        assert_eq!(n, 512);

        let info = service.file_information(opened.handle).await.unwrap();
        assert_eq!(info.name, "movie.ts");
        assert_eq!(info.size, 1024);
        assert_eq!(info.attributes, FILE_ATTRIBUTES);

        service.cleanup(opened.handle).await.unwrap();
        service.close(opened.handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_path_has_no_side_effects() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();

        // Broken interior segment is a path error, missing leaf a file one.
        let err = open(&service, "\\NoSuchShare\\x").await.unwrap_err();
        assert!(matches!(err, MountError::PathNotFound(_)));
        let err = open(&service, "\\Share1\\nope.ts").await.unwrap_err();
        assert!(matches!(err, MountError::FileNotFound(_)));

        assert_eq!(service.state.lock().await.handles.len(), 0);
    }

    #[tokio::test]
    async fn test_open_directory_rejects_files() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service
            .add_resource("Share1", file("movie.ts", 16))
            .await
            .unwrap();

        let err = service.open_directory("\\Share1\\movie.ts").await.unwrap_err();
        assert!(matches!(err, MountError::PathNotFound(_)));
        let err = service.open_directory("\\NoSuchShare").await.unwrap_err();
        assert!(matches!(err, MountError::PathNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_files_on_directory_resource() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();

        let clips = MemoryResource::directory("clips");
        clips.add_child(Arc::new(MemoryResource::directory("sub")));
        clips.add_child(file("a.ts", 4));
        service
            .add_resource("Share1", Arc::new(clips))
            .await
            .unwrap();

        let handle = service.open_directory("\\Share1\\clips").await.unwrap();
        let entries = service.find_files(handle).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.ts");
        assert_eq!(entries[0].attributes, FILE_ATTRIBUTES);
        assert_eq!(entries[0].size, 4);
        assert_eq!(entries[1].name, "sub");
        assert_eq!(entries[1].attributes, DIRECTORY_ATTRIBUTES);
    }

    #[tokio::test]
    async fn test_find_files_reflects_mount_root_changes() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        let movie = file("movie.ts", 8);
        service.add_resource("Share1", movie.clone()).await.unwrap();

        let handle = service.open_directory("\\Share1").await.unwrap();
        assert_eq!(service.find_files(handle).await.unwrap().len(), 1);

        service.add_resource("Share1", file("other.ts", 8)).await.unwrap();
        assert_eq!(service.find_files(handle).await.unwrap().len(), 2);

        service.remove_resource("Share1", movie.as_ref()).await;
        let entries = service.find_files(handle).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "other.ts");
    }

    #[tokio::test]
    async fn test_lazy_directory_enumeration_is_cached() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();

        let clips = Arc::new(MemoryResource::directory("clips"));
        clips.add_child(file("a.ts", 4));
        clips.add_child(file("b.ts", 4));
        service.add_resource("Share1", clips.clone()).await.unwrap();

        let handle = service.open_directory("\\Share1\\clips").await.unwrap();
        assert_eq!(service.find_files(handle).await.unwrap().len(), 2);

        // Later changes in the backing accessor are not reflected: the
        // child collection was cached on first enumeration.
        clips.add_child(file("c.ts", 4));
        assert_eq!(service.find_files(handle).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dispose_invalidates_open_handles() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service
            .add_resource("Share1", file("movie.ts", 64))
            .await
            .unwrap();

        let opened = open(&service, "\\Share1\\movie.ts").await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(service.read(opened.handle, 0, &mut buf).await.unwrap(), 16);

        service.dispose_root_directory("Share1").await;

        // The handle must fail, not read stale data.
        assert!(matches!(
            service.read(opened.handle, 0, &mut buf).await,
            Err(MountError::InvalidHandle)
        ));
        assert!(service.file_information(opened.handle).await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_releases_stream_but_keeps_handle() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service
            .add_resource("Share1", file("movie.ts", 64))
            .await
            .unwrap();

        let opened = open(&service, "\\Share1\\movie.ts").await.unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(service.read(opened.handle, 0, &mut buf).await.unwrap(), 16);

        service.cleanup(opened.handle).await.unwrap();

        // The handle is still associated; the next read reopens lazily.
        assert_eq!(service.read(opened.handle, 0, &mut buf).await.unwrap(), 16);
        assert!(service.file_information(opened.handle).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_handle_is_never_reused() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service
            .add_resource("Share1", file("movie.ts", 64))
            .await
            .unwrap();

        let opened = open(&service, "\\Share1\\movie.ts").await.unwrap();
        service.close(opened.handle).await.unwrap();

        let mut buf = [0u8; 16];
        assert!(matches!(
            service.read(opened.handle, 0, &mut buf).await,
            Err(MountError::InvalidHandle)
        ));

        // Closing again (or cleaning up) stays a no-op.
        service.close(opened.handle).await.unwrap();
        service.cleanup(opened.handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_on_synthetic_directory_fails() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        let handle = service.open_directory("\\Share1").await.unwrap();

        let mut buf = [0u8; 8];
        assert!(matches!(
            service.read(handle, 0, &mut buf).await,
            Err(MountError::AccessorUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_root_stat_and_listing() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service.create_root_directory("Share2").await.unwrap();

        let opened = open(&service, "\\").await.unwrap();
        assert!(opened.is_directory);
        let info = service.file_information(opened.handle).await.unwrap();
        assert_eq!(info.attributes, DIRECTORY_ATTRIBUTES);
        assert_eq!(info.size, 0);

        let entries = service.find_files(opened.handle).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Share1", "Share2"]);
    }

    #[tokio::test]
    async fn test_mutating_calls_are_unsupported() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service
            .add_resource("Share1", file("movie.ts", 16))
            .await
            .unwrap();
        let opened = open(&service, "\\Share1\\movie.ts").await.unwrap();

        let unsupported = |result: MountResult<()>| {
            assert!(matches!(result, Err(MountError::Unsupported(_))));
        };

        unsupported(service.create_directory("\\Share1\\new").await);
        unsupported(
            service
                .write(opened.handle, 0, b"x")
                .await
                .map(|_| ()),
        );
        unsupported(service.flush(opened.handle).await);
        unsupported(
            service
                .set_attributes("\\Share1\\movie.ts", FILE_ATTRIBUTES)
                .await,
        );
        unsupported(
            service
                .set_file_time("\\Share1\\movie.ts", None, None, None)
                .await,
        );
        unsupported(service.delete_file("\\Share1\\movie.ts").await);
        unsupported(service.delete_directory("\\Share1").await);
        unsupported(
            service
                .move_file("\\Share1\\movie.ts", "\\Share1\\x.ts", false)
                .await,
        );
        unsupported(service.set_end_of_file("\\Share1\\movie.ts", 0).await);
        unsupported(service.set_allocation_size("\\Share1\\movie.ts", 0).await);
    }

    #[tokio::test]
    async fn test_locks_accepted_and_disk_space_zero() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service
            .add_resource("Share1", file("movie.ts", 16))
            .await
            .unwrap();
        let opened = open(&service, "\\Share1\\movie.ts").await.unwrap();

        service.lock_file(opened.handle, 0, 8).await.unwrap();
        service.unlock_file(opened.handle, 0, 8).await.unwrap();

        let space = service.disk_free_space().await.unwrap();
        assert_eq!(space.free_bytes_available, 0);
        assert_eq!(space.total_bytes, 0);
        assert_eq!(space.total_free_bytes, 0);
    }

    #[tokio::test]
    async fn test_unmount_disposes_everything() {
        let service = service();
        service.create_root_directory("Share1").await.unwrap();
        service
            .add_resource("Share1", file("movie.ts", 16))
            .await
            .unwrap();
        let opened = open(&service, "\\Share1\\movie.ts").await.unwrap();

        FilesystemHandler::unmount(&service).await.unwrap();

        assert!(service.root_directories().await.is_empty());
        let mut buf = [0u8; 8];
        assert!(service.read(opened.handle, 0, &mut buf).await.is_err());
    }
}
