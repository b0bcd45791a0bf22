/// Screen wake lock
///
/// Keeps the screen from auto-locking while listening. The platform revokes
/// the lock whenever the page is hidden, so the controller re-acquires it
/// when the page becomes visible again and the activity is still running.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum WakeLockError {
    #[error("Wake lock not supported")]
    Unsupported,

    #[error("Wake lock request denied: {0}")]
    Denied(String),

    #[error("Wake lock release failed: {0}")]
    Release(String),
}

/// Page visibility as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// A granted screen lock
#[async_trait]
pub trait WakeLockSentinel: Send {
    /// True once the platform (or a previous release) dropped the lock
    fn is_released(&self) -> bool;

    async fn release(&mut self) -> Result<(), WakeLockError>;
}

/// Platform screen wake-lock capability
#[async_trait]
pub trait ScreenWakeLock: Send + Sync {
    async fn request(&self) -> Result<Box<dyn WakeLockSentinel>, WakeLockError>;
}

/// Holds at most one screen lock for the duration of a listening activity
pub struct WakeLockController {
    lock: Box<dyn ScreenWakeLock>,
    held: Option<Box<dyn WakeLockSentinel>>,
    wanted: bool,
}

impl WakeLockController {
    pub fn new(lock: Box<dyn ScreenWakeLock>) -> Self {
        Self {
            lock,
            held: None,
            wanted: false,
        }
    }

    /// Request the lock and keep wanting it until `release`. Returns whether a lock is held.
    pub async fn acquire(&mut self) -> bool {
        self.wanted = true;

        if self.is_held() {
            debug!("Wake lock already held");
            return true;
        }

        self.request().await
    }

    /// Release the lock, if any, and stop re-acquiring. Always safe to call.
    pub async fn release(&mut self) {
        self.wanted = false;

        if let Some(mut sentinel) = self.held.take() {
            if sentinel.is_released() {
                debug!("Wake lock already revoked by platform");
                return;
            }
            match sentinel.release().await {
                Ok(()) => info!("Wake lock released"),
                Err(e) => debug!("Wake lock release ignored: {}", e),
            }
        }
    }

    /// React to a page visibility change
    pub async fn on_visibility(&mut self, visibility: Visibility) {
        match visibility {
            Visibility::Hidden => {
                // The platform revokes screen locks for hidden pages
                if self.held.as_ref().is_some_and(|s| s.is_released()) {
                    debug!("Wake lock revoked while hidden");
                    self.held = None;
                }
            }
            Visibility::Visible => {
                if self.wanted && !self.is_held() {
                    info!("Page visible again, re-acquiring wake lock");
                    self.request().await;
                }
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.as_ref().is_some_and(|s| !s.is_released())
    }

    async fn request(&mut self) -> bool {
        match self.lock.request().await {
            Ok(sentinel) => {
                info!("Screen wake lock acquired");
                self.held = Some(sentinel);
                true
            }
            Err(e) => {
                warn!("Screen wake lock unavailable, continuing without it: {}", e);
                self.held = None;
                false
            }
        }
    }
}

impl Drop for WakeLockController {
    fn drop(&mut self) {
        let Some(mut sentinel) = self.held.take() else {
            return;
        };
        if sentinel.is_released() {
            return;
        }

        // Release is async; hand it to the runtime if there is one
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    match sentinel.release().await {
                        Ok(()) => info!("Wake lock released on drop"),
                        Err(e) => debug!("Wake lock release on drop ignored: {}", e),
                    }
                });
            }
            Err(_) => warn!("Wake lock dropped outside a runtime, left to the platform"),
        }
    }
}

/// Wake lock for hosts without a screen; every request fails
pub struct NoScreenWakeLock;

#[async_trait]
impl ScreenWakeLock for NoScreenWakeLock {
    async fn request(&self) -> Result<Box<dyn WakeLockSentinel>, WakeLockError> {
        Err(WakeLockError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeSentinel {
        revoked: Arc<AtomicBool>,
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WakeLockSentinel for FakeSentinel {
        fn is_released(&self) -> bool {
            self.revoked.load(Ordering::SeqCst)
        }

        async fn release(&mut self) -> Result<(), WakeLockError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.revoked.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct FakeLock {
        requests: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
        revoked: Arc<AtomicBool>,
        deny: bool,
    }

    #[async_trait]
    impl ScreenWakeLock for FakeLock {
        async fn request(&self) -> Result<Box<dyn WakeLockSentinel>, WakeLockError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.deny {
                return Err(WakeLockError::Denied("not allowed".to_string()));
            }
            self.revoked.store(false, Ordering::SeqCst);
            Ok(Box::new(FakeSentinel {
                revoked: self.revoked.clone(),
                releases: self.releases.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let fake = FakeLock::default();
        let mut controller = WakeLockController::new(Box::new(fake.clone()));

        assert!(controller.acquire().await);
        assert!(controller.acquire().await);
        assert_eq!(fake.requests.load(Ordering::SeqCst), 1);

        controller.release().await;
        controller.release().await;
        assert!(!controller.is_held());
        assert_eq!(fake.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reacquire_after_revocation() {
        let fake = FakeLock::default();
        let mut controller = WakeLockController::new(Box::new(fake.clone()));
        controller.acquire().await;

        // Page hidden: platform drops the lock
        fake.revoked.store(true, Ordering::SeqCst);
        controller.on_visibility(Visibility::Hidden).await;
        assert!(!controller.is_held());

        controller.on_visibility(Visibility::Visible).await;
        assert!(controller.is_held());
        assert_eq!(fake.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_reacquire_after_release() {
        let fake = FakeLock::default();
        let mut controller = WakeLockController::new(Box::new(fake.clone()));
        controller.acquire().await;
        controller.release().await;

        controller.on_visibility(Visibility::Visible).await;
        assert!(!controller.is_held());
        assert_eq!(fake.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_is_not_fatal() {
        let fake = FakeLock {
            deny: true,
            ..Default::default()
        };
        let mut controller = WakeLockController::new(Box::new(fake));

        assert!(!controller.acquire().await);
        controller.release().await;
        assert!(!controller.is_held());
    }

    #[tokio::test]
    async fn test_drop_releases_held_lock() {
        let fake = FakeLock::default();
        let mut controller = WakeLockController::new(Box::new(fake.clone()));
        controller.acquire().await;

        drop(controller);
        for _ in 0..10 {
            if fake.releases.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(fake.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_after_release_is_quiet() {
        let fake = FakeLock::default();
        let mut controller = WakeLockController::new(Box::new(fake.clone()));
        controller.acquire().await;
        controller.release().await;

        drop(controller);
        tokio::task::yield_now().await;
        assert_eq!(fake.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_lock() {
        let mut controller = WakeLockController::new(Box::new(NoScreenWakeLock));
        assert!(!controller.acquire().await);
    }
}
