//! Graceful shutdown coordination utilities.
//!
//! Provides a lightweight [`ShutdownCoordinator`] that can be shared across
//! tasks to detect Ctrl+C or an exhausted time budget and stop submitting
//! pages without leaving partially written files behind.

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

static GLOBAL_SHUTDOWN: OnceCell<SharedShutdown> = OnceCell::new();

/// Register a global shutdown handle so subsystems can discover it lazily.
pub fn set_global_shutdown(handle: SharedShutdown) {
    let _ = GLOBAL_SHUTDOWN.set(handle);
}

/// Retrieve the registered global shutdown handle, if available.
pub fn get_global_shutdown() -> Option<SharedShutdown> {
    GLOBAL_SHUTDOWN.get().cloned()
}

/// Why shutdown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C or another user signal
    UserInterrupt,
    /// The job's time budget ran out
    TimeBudget,
    /// Requested programmatically
    Requested,
}

impl ShutdownReason {
    fn as_u8(self) -> u8 {
        match self {
            ShutdownReason::UserInterrupt => 1,
            ShutdownReason::TimeBudget => 2,
            ShutdownReason::Requested => 3,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ShutdownReason::UserInterrupt),
            2 => Some(ShutdownReason::TimeBudget),
            3 => Some(ShutdownReason::Requested),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShutdownReason::UserInterrupt => "interrupted by user",
            ShutdownReason::TimeBudget => "time budget exhausted",
            ShutdownReason::Requested => "shutdown requested",
        };
        write!(f, "{s}")
    }
}

/// Coordinates graceful shutdown across async tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    reason: AtomicU8,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
            reason: AtomicU8::new(0),
            notify: Notify::new(),
        }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Notifies all registered waiters exactly once.
    pub fn request_shutdown(&self) {
        self.request_shutdown_with(ShutdownReason::Requested);
    }

    /// Request shutdown, recording why. The first reason wins.
    pub fn request_shutdown_with(&self, reason: ShutdownReason) {
        let _ = self
            .reason
            .compare_exchange(0, reason.as_u8(), Ordering::SeqCst, Ordering::SeqCst);
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Reason of the first request, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        ShutdownReason::from_u8(self.reason.load(Ordering::SeqCst))
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }
}
