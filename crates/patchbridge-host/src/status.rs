//! Bridge health, readable from controller / UI threads.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Consecutive missed handoffs after which the bridge counts as desynced.
pub const DESYNC_THRESHOLD: u32 = 50;

#[derive(Default)]
pub struct BridgeStatus {
    active: AtomicBool,
    desync_count: AtomicU32,
    handoffs: AtomicU64,
    missed_handoffs: AtomicU64,
    error_message: Mutex<Option<String>>,
}

impl BridgeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Consecutive handoffs the scheduler has missed.
    pub fn desync_count(&self) -> u32 {
        self.desync_count.load(Ordering::Relaxed)
    }

    pub fn is_desynced(&self) -> bool {
        self.desync_count() >= DESYNC_THRESHOLD
    }

    /// Quanta handed to the scheduler since creation, hit or miss.
    pub fn handoffs(&self) -> u64 {
        self.handoffs.load(Ordering::Relaxed)
    }

    pub fn missed_handoffs(&self) -> u64 {
        self.missed_handoffs.load(Ordering::Relaxed)
    }

    /// Record a successful handoff. Returns the miss streak it ended.
    pub(crate) fn record_hit(&self) -> u32 {
        self.handoffs.fetch_add(1, Ordering::Relaxed);
        self.desync_count.swap(0, Ordering::Relaxed)
    }

    /// Record a missed handoff. Returns the new miss streak.
    pub(crate) fn record_miss(&self) -> u32 {
        self.handoffs.fetch_add(1, Ordering::Relaxed);
        self.missed_handoffs.fetch_add(1, Ordering::Relaxed);
        self.desync_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// User-facing configuration or launch problem, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error_message.lock().clone()
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        *self.error_message.lock() = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desync_streak() {
        let status = BridgeStatus::new();
        for _ in 0..DESYNC_THRESHOLD - 1 {
            status.record_miss();
        }
        assert!(!status.is_desynced());
        assert_eq!(status.record_miss(), DESYNC_THRESHOLD);
        assert!(status.is_desynced());

        assert_eq!(status.record_hit(), DESYNC_THRESHOLD);
        assert!(!status.is_desynced());
        assert_eq!(status.handoffs(), DESYNC_THRESHOLD as u64 + 1);
        assert_eq!(status.missed_handoffs(), DESYNC_THRESHOLD as u64);
    }

    #[test]
    fn test_error_message() {
        let status = BridgeStatus::new();
        assert!(status.error_message().is_none());
        status.set_error("scheduler executable not found");
        assert_eq!(
            status.error_message().as_deref(),
            Some("scheduler executable not found")
        );
    }
}
