//! The resource mounting service.
//!
//! Owns the mount tree and the handle table behind a single tree lock, and
//! runs the drive mapping through a [`FilesystemBridge`]. The hosting
//! application mutates the tree through the methods here; the OS bridge
//! reads it through the [`crate::FilesystemHandler`] surface the service
//! also implements.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::accessor::ResourceAccessor;
use crate::bridge::FilesystemBridge;
use crate::config::MountConfig;
use crate::error::MountResult;
use crate::handle::{HandleId, HandleTable, StreamSlot};
use crate::handler::FilesystemHandler;
use crate::tree::Tree;

pub(crate) struct ServiceState {
    pub(crate) tree: Tree,
    pub(crate) handles: HandleTable,
    pub(crate) started: bool,
    pub(crate) bridge: Option<Arc<dyn FilesystemBridge>>,
}

/// Exposes hosting-application resource accessors as a read-only virtual
/// drive.
///
/// All tree structure, handle registration, and mount bookkeeping is guarded
/// by one async mutex (the tree lock). The lock is held for structure
/// manipulation only, never across byte I/O: see
/// [`crate::FilesystemHandler::read`].
pub struct ResourceMountingService {
    config: MountConfig,
    pub(crate) state: Mutex<ServiceState>,
}

impl ResourceMountingService {
    /// Create a service claiming the configured drive. Nothing is visible
    /// to the OS until [`ResourceMountingService::startup`].
    pub fn new(config: MountConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ServiceState {
                tree: Tree::new(),
                handles: HandleTable::new(),
                started: false,
                bridge: None,
            }),
        }
    }

    /// The configured drive letter.
    pub fn drive_letter(&self) -> char {
        self.config.drive_letter
    }

    /// The drive configuration.
    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// The drive's mount point, e.g. `V:\`.
    pub fn mount_point(&self) -> String {
        self.config.mount_point()
    }

    fn root_path(&self, root_name: &str) -> String {
        format!("{}:\\{}", self.config.drive_letter, root_name)
    }

    /// Names of the current mount roots.
    pub async fn root_directories(&self) -> Vec<String> {
        let mut state = self.state.lock().await;
        let root = state.tree.root();
        let ids = match state.tree.child_ids(root).await {
            Ok(ids) => ids,
            Err(_) => return Vec::new(),
        };
        let mut names: Vec<String> = ids
            .into_iter()
            .filter_map(|id| state.tree.node(id).map(|node| node.name.clone()))
            .collect();
        names.sort();
        names
    }

    /// Create a new empty mount root, returning its externally visible path
    /// (`<letter>:\<name>`).
    ///
    /// A duplicate name is a caller configuration error and fails with
    /// [`crate::MountError::DuplicateRootName`]; the existing root is left
    /// untouched.
    pub async fn create_root_directory(&self, root_name: &str) -> MountResult<String> {
        let mut state = self.state.lock().await;
        state.tree.insert_root(root_name)?;
        debug!(root = root_name, "created mount root");
        Ok(self.root_path(root_name))
    }

    /// Remove and recursively dispose the named mount root, releasing every
    /// open handle and stream beneath it. Unknown names are a silent no-op.
    ///
    /// Disposal is total: when this returns, no stream opened under the
    /// root remains open, and reads on surviving handle tokens fail.
    pub async fn dispose_root_directory(&self, root_name: &str) {
        let slots = {
            let mut state = self.state.lock().await;
            let Some(root_id) = state.tree.find_root(root_name) else {
                return;
            };
            let tree_root = state.tree.root();
            state.tree.unlink_child(tree_root, root_name);
            let handle_ids = state.tree.remove_subtree(root_id);
            debug!(root = root_name, handles = handle_ids.len(), "disposed mount root");
            detach_handles(&mut state, handle_ids)
        };
        drain_slots(slots).await;
    }

    /// Wrap an accessor and mount it under the named root, returning its
    /// externally visible path (`<letter>:\<root>\<resource>`).
    ///
    /// The accessor's directory capability decides whether it becomes a
    /// virtual file or a lazily expanded directory.
    pub async fn add_resource(
        &self,
        root_name: &str,
        accessor: Arc<dyn ResourceAccessor>,
    ) -> MountResult<String> {
        let mut state = self.state.lock().await;
        let root_id = state
            .tree
            .find_root(root_name)
            .ok_or_else(|| crate::MountError::unknown_root(root_name))?;
        let resource_name = accessor.resource_name();
        state.tree.add_resource(root_id, accessor)?;
        debug!(root = root_name, resource = %resource_name, "added resource");
        Ok(format!(
            "{}\\{}",
            self.root_path(root_name),
            resource_name
        ))
    }

    /// Dispose the resource with the accessor's name under the named root.
    /// Absent roots and absent resources are silent no-ops.
    pub async fn remove_resource(&self, root_name: &str, accessor: &dyn ResourceAccessor) {
        let resource_name = accessor.resource_name();
        let slots = {
            let mut state = self.state.lock().await;
            let Some(root_id) = state.tree.find_root(root_name) else {
                return;
            };
            let Some(node_id) = state.tree.unlink_child(root_id, &resource_name) else {
                return;
            };
            let handle_ids = state.tree.remove_subtree(node_id);
            debug!(root = root_name, resource = %resource_name, "removed resource");
            detach_handles(&mut state, handle_ids)
        };
        drain_slots(slots).await;
    }

    /// Snapshot of the named root's immediate children's backing accessors,
    /// for hosting-application introspection.
    pub async fn resources(&self, root_name: &str) -> MountResult<Vec<Arc<dyn ResourceAccessor>>> {
        let mut state = self.state.lock().await;
        let root_id = state
            .tree
            .find_root(root_name)
            .ok_or_else(|| crate::MountError::unknown_root(root_name))?;
        let ids = state.tree.child_ids(root_id).await?;
        Ok(ids
            .into_iter()
            .filter_map(|id| state.tree.node(id).and_then(|node| node.accessor().cloned()))
            .collect())
    }

    /// Hand the protocol surface to the bridge and run the drive mapping on
    /// its own worker task. The mount point becomes visible to the OS only
    /// once the bridge is running.
    pub async fn startup(self: Arc<Self>, bridge: Arc<dyn FilesystemBridge>) {
        let mut state = self.state.lock().await;
        let handler: Arc<dyn FilesystemHandler> = self.clone();
        let config = self.config.clone();
        let worker = bridge.clone();
        tokio::spawn(async move {
            if let Err(err) = worker.mount(&config, handler).await {
                warn!(%err, "filesystem bridge exited with error");
            }
        });
        state.bridge = Some(bridge);
        state.started = true;
        info!(drive = %self.config.drive_letter, "resource mounting service started");
    }

    /// Dispose the whole tree, then drop the drive mapping. If the bridge
    /// was never started, the unmount request is skipped.
    pub async fn shutdown(&self) {
        let (slots, bridge) = {
            let mut state = self.state.lock().await;
            let slots = dispose_all(&mut state);
            let bridge = if state.started {
                state.bridge.take()
            } else {
                None
            };
            state.started = false;
            (slots, bridge)
        };
        drain_slots(slots).await;
        if let Some(bridge) = bridge {
            if let Err(err) = bridge.unmount(self.config.drive_letter).await {
                warn!(%err, "drive unmount failed");
            }
        }
        info!(drive = %self.config.drive_letter, "resource mounting service stopped");
    }
}

/// Pull the given handles out of the table and flag their slots; the caller
/// drains the streams once the tree lock is released.
pub(crate) fn detach_handles(
    state: &mut ServiceState,
    handle_ids: Vec<HandleId>,
) -> Vec<Arc<StreamSlot>> {
    let mut slots = Vec::with_capacity(handle_ids.len());
    for id in handle_ids {
        if let Some(handle) = state.handles.remove(id) {
            handle.slot.invalidate();
            slots.push(handle.slot);
        }
    }
    slots
}

/// Dispose every mount root and every open session.
pub(crate) fn dispose_all(state: &mut ServiceState) -> Vec<Arc<StreamSlot>> {
    state.tree.clear();
    state
        .handles
        .drain()
        .into_iter()
        .map(|handle| {
            handle.slot.invalidate();
            handle.slot
        })
        .collect()
}

/// Release detached streams. An in-flight read on another task is allowed
/// to complete first; disposal then drops the stream.
pub(crate) async fn drain_slots(slots: Vec<Arc<StreamSlot>>) {
    for slot in slots {
        slot.release().await;
    }
}
