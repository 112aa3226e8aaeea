//! # vmount-kernel
//!
//! Core of the virtual resource-mounting filesystem: exposes arbitrary
//! in-process resource accessors (network shares, archive entries, streamed
//! media, local directories) as a read-only virtual drive, so consumers
//! that only accept filesystem paths (tag readers, external players) can
//! open them like ordinary files.
//!
//! Key components:
//!
//! - [`ResourceAccessor`] / [`ResourceStream`] - the contract the hosting
//!   application implements for each data source it wants mounted
//! - [`ResourceMountingService`] - owns the mount tree (named mount roots,
//!   virtual files, lazily expanded directories) and the handle table
//! - [`FilesystemHandler`] - the read-only protocol callback surface the
//!   OS bridge dispatches into (open/read/enumerate/stat/close; every
//!   mutating call fails)
//! - [`FilesystemBridge`] - the seam to the actual user-mode driver, with
//!   [`InProcessBridge`] as the loopback used in tests
//!
//! ## Design decisions
//!
//! - **One tree lock**: all tree structure and handle bookkeeping sits
//!   behind a single async mutex, held for pointer work only; byte I/O
//!   always happens outside it.
//! - **Lazy directories expand once**: a directory accessor is enumerated
//!   on first touch and the result cached until the node is disposed, even
//!   if the underlying resource changes.
//! - **Disposal is total**: removing a mount root synchronously releases
//!   every descendant node, handle, and open stream.

pub mod accessor;
pub mod accessors;
pub mod bridge;
pub mod config;
pub mod error;
mod handle;
pub mod handler;
pub mod service;
mod tree;
pub mod types;

pub use accessor::{ResourceAccessor, ResourceStream};
pub use accessors::{LocalResource, MemoryResource};
pub use bridge::{FilesystemBridge, InProcessBridge};
pub use config::MountConfig;
pub use error::{MountError, MountResult};
pub use handle::HandleId;
pub use handler::{FilesystemHandler, OpenedFile};
pub use service::ResourceMountingService;
pub use types::{
    CreationDisposition, DIRECTORY_ATTRIBUTES, DiskFreeSpace, FILE_ATTRIBUTES, FileAttributes,
    FileInformation, OpenAccess, ResourceKind, ShareAccess,
};
