//! Handle table: per-open-session bookkeeping.
//!
//! Each open session maps a handle token to a tree node plus a lazily
//! opened byte stream. The table itself is guarded by the service's tree
//! lock; the stream slot has its own async mutex so the actual byte I/O
//! happens outside that lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::accessor::{ResourceAccessor, ResourceStream};
use crate::error::{MountError, MountResult};
use crate::tree::NodeId;

/// Opaque token identifying one open session on the mounted drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    #[cfg(test)]
    pub(crate) fn test_token(raw: u64) -> Self {
        Self(raw)
    }
}

/// The lazily opened byte stream belonging to one handle.
///
/// The slot's mutex serializes lazy open and positioned reads per handle;
/// the invalidated flag is set when the owning node is disposed, so a later
/// read cannot reopen a stream from a dead accessor.
pub(crate) struct StreamSlot {
    invalidated: AtomicBool,
    stream: Mutex<Option<Box<dyn ResourceStream>>>,
}

impl StreamSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            invalidated: AtomicBool::new(false),
            stream: Mutex::new(None),
        })
    }

    /// Mark the owning node as disposed. The stream itself is drained by a
    /// following [`StreamSlot::release`].
    pub(crate) fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// Drop the open stream, if any. Waits for an in-flight read to finish;
    /// close failures cannot surface past here, so disposal always
    /// completes.
    pub(crate) async fn release(&self) {
        self.stream.lock().await.take();
    }

    /// Positioned read through the lazily opened stream.
    ///
    /// Called with no tree lock held; the slot mutex alone covers the lazy
    /// open and the read, so one slow read never stalls tree operations or
    /// reads on other handles.
    pub(crate) async fn read_at(
        &self,
        accessor: Option<Arc<dyn ResourceAccessor>>,
        offset: u64,
        buf: &mut [u8],
    ) -> MountResult<usize> {
        if self.is_invalidated() {
            return Err(MountError::HandleClosed);
        }
        let mut guard = self.stream.lock().await;
        // Recheck: a disposal may have raced us to the slot.
        if self.is_invalidated() {
            return Err(MountError::HandleClosed);
        }
        if guard.is_none() {
            let accessor = accessor
                .ok_or_else(|| MountError::accessor_unavailable("resource has no backing accessor"))?;
            *guard = Some(accessor.open_read().await?);
        }
        let stream = guard.as_mut().expect("stream opened above");
        Ok(stream.read_at(offset, buf).await?)
    }
}

/// One open session: the node association plus the stream slot.
///
/// The node id is a non-owning back-reference used purely for lookup during
/// cleanup; the node's lifetime is controlled by the tree alone.
pub(crate) struct FileHandle {
    pub(crate) node: NodeId,
    pub(crate) is_directory: bool,
    pub(crate) slot: Arc<StreamSlot>,
}

/// Maps handle tokens to open sessions.
#[derive(Default)]
pub(crate) struct HandleTable {
    handles: HashMap<HandleId, FileHandle>,
    next: u64,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a new session against a node. Tokens are never reused.
    pub(crate) fn insert(&mut self, node: NodeId, is_directory: bool) -> (HandleId, Arc<StreamSlot>) {
        self.next += 1;
        let id = HandleId(self.next);
        let slot = StreamSlot::new();
        self.handles.insert(
            id,
            FileHandle {
                node,
                is_directory,
                slot: slot.clone(),
            },
        );
        (id, slot)
    }

    pub(crate) fn get(&self, id: HandleId) -> Option<&FileHandle> {
        self.handles.get(&id)
    }

    pub(crate) fn remove(&mut self, id: HandleId) -> Option<FileHandle> {
        self.handles.remove(&id)
    }

    /// Discard every session (service shutdown / OS unmount).
    pub(crate) fn drain(&mut self) -> Vec<FileHandle> {
        self.handles.drain().map(|(_, handle)| handle).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}
