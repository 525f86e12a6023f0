//! Tunnel lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique tunnel IDs for tracing
//! - Count spliced upgrade connections still running
//! - Keep the `relay_active_tunnels` gauge in step

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Using relaxed ordering is sufficient since we only need uniqueness.
static TUNNEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a spliced upgrade connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TunnelId(u64);

impl TunnelId {
    pub fn new() -> Self {
        Self(TUNNEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TunnelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TunnelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tunnel-{}", self.0)
    }
}

/// Counts tunnels that are currently splicing bytes.
#[derive(Debug, Clone, Default)]
pub struct TunnelTracker {
    active_count: Arc<AtomicU64>,
}

impl TunnelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new tunnel. The returned guard releases it on drop.
    pub fn track(&self) -> TunnelGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::tunnel_opened();
        TunnelGuard {
            active_count: Arc::clone(&self.active_count),
            id: TunnelId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Keeps a tunnel counted while alive.
#[derive(Debug)]
pub struct TunnelGuard {
    active_count: Arc<AtomicU64>,
    id: TunnelId,
}

impl TunnelGuard {
    pub fn id(&self) -> TunnelId {
        self.id
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::tunnel_closed();
        tracing::trace!(tunnel = %self.id, "Tunnel released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_ids_are_unique() {
        assert_ne!(TunnelId::new(), TunnelId::new());
    }

    #[test]
    fn tracker_counts_guards() {
        let tracker = TunnelTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(first.id(), second.id());

        drop(first);
        assert_eq!(tracker.active_count(), 1);
        drop(second);
        assert_eq!(tracker.active_count(), 0);
    }
}
