//! Live connection tracking.
//!
//! # Responsibilities
//! - Count connections whose task is still driving a context
//! - Publish the count as a gauge
//! - Let shutdown wait for the count to drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    active: AtomicU64,
    drained: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let count = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_contexts(count);
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection is gone or `timeout` elapses.
    /// Returns whether the tracker drained.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drain = async {
            loop {
                let notified = self.inner.drained.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drain).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<Inner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.inner.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_contexts(remaining);
        if remaining == 0 {
            self.inner.drained.notify_waiters();
        }
    }
}
