//! Filesystem bridge contract.
//!
//! The OS-level user-mode filesystem driver lives outside this crate; the
//! core only hands it a [`FilesystemHandler`] and asks it to claim or
//! release the configured drive. Keeping the driver behind this trait is
//! what makes the rest of the crate testable without a kernel component.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::config::MountConfig;
use crate::error::MountResult;
use crate::handler::FilesystemHandler;

/// Driver-side contract for claiming and releasing the virtual drive.
#[async_trait]
pub trait FilesystemBridge: Send + Sync {
    /// Claim the configured drive and dispatch filesystem requests into
    /// `handler` until the drive is unmounted.
    async fn mount(
        &self,
        config: &MountConfig,
        handler: Arc<dyn FilesystemHandler>,
    ) -> MountResult<()>;

    /// Remove the drive mapping.
    async fn unmount(&self, drive_letter: char) -> MountResult<()>;
}

struct MountedDrive {
    drive_letter: char,
    handler: Arc<dyn FilesystemHandler>,
}

/// Loopback bridge for tests and embedders without an OS driver.
///
/// Records the mount and exposes the handler it was given, so callers can
/// drive the protocol surface directly, the same calls a real driver
/// bridge would make.
#[derive(Default)]
pub struct InProcessBridge {
    mounted: Mutex<Option<MountedDrive>>,
    unmounted: Notify,
}

impl InProcessBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a drive mapping is held.
    pub fn is_mounted(&self) -> bool {
        self.mounted
            .lock()
            .map(|mounted| mounted.is_some())
            .unwrap_or(false)
    }

    /// The handler of the current mount, if any.
    pub fn handler(&self) -> Option<Arc<dyn FilesystemHandler>> {
        self.mounted
            .lock()
            .ok()
            .and_then(|mounted| mounted.as_ref().map(|drive| drive.handler.clone()))
    }
}

#[async_trait]
impl FilesystemBridge for InProcessBridge {
    async fn mount(
        &self,
        config: &MountConfig,
        handler: Arc<dyn FilesystemHandler>,
    ) -> MountResult<()> {
        {
            let mut mounted = self
                .mounted
                .lock()
                .map_err(|_| crate::MountError::accessor_unavailable("bridge lock poisoned"))?;
            if mounted.is_some() {
                return Err(crate::MountError::already_exists(config.mount_point()));
            }
            *mounted = Some(MountedDrive {
                drive_letter: config.drive_letter,
                handler,
            });
        }
        // Park until unmounted; the notified future is created before the
        // state check so a wakeup between the two is not lost.
        loop {
            let unmounted = self.unmounted.notified();
            if !self.is_mounted() {
                return Ok(());
            }
            unmounted.await;
        }
    }

    async fn unmount(&self, drive_letter: char) -> MountResult<()> {
        if let Ok(mut mounted) = self.mounted.lock() {
            if mounted
                .as_ref()
                .is_some_and(|drive| drive.drive_letter == drive_letter)
            {
                *mounted = None;
            }
        }
        self.unmounted.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountConfig;
    use crate::service::ResourceMountingService;

    #[tokio::test]
    async fn test_mount_runs_until_unmounted() {
        let bridge = Arc::new(InProcessBridge::new());
        let service = Arc::new(ResourceMountingService::new(MountConfig::new('Q')));
        let handler: Arc<dyn FilesystemHandler> = service;

        let worker = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.mount(&MountConfig::new('Q'), handler).await })
        };
        tokio::task::yield_now().await;
        assert!(bridge.is_mounted());
        assert!(bridge.handler().is_some());

        // Unmounting a different letter is ignored.
        bridge.unmount('Z').await.unwrap();
        assert!(bridge.is_mounted());

        bridge.unmount('Q').await.unwrap();
        worker.await.unwrap().unwrap();
        assert!(!bridge.is_mounted());
    }

    #[tokio::test]
    async fn test_double_mount_rejected() {
        let bridge = Arc::new(InProcessBridge::new());
        let service = Arc::new(ResourceMountingService::new(MountConfig::new('Q')));
        let handler: Arc<dyn FilesystemHandler> = service.clone();

        let worker = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.mount(&MountConfig::new('Q'), handler).await })
        };
        tokio::task::yield_now().await;

        let second: Arc<dyn FilesystemHandler> = service;
        assert!(bridge.mount(&MountConfig::new('R'), second).await.is_err());

        bridge.unmount('Q').await.unwrap();
        worker.await.unwrap().unwrap();
    }
}
