//! Named cross-process synchronization: the transfer mutex and two handoff events.
//!
//! Events behave as auto-reset events everywhere: `wait` consumes the
//! signal, `signal` is idempotent and `clear` drops a pending signal.
//! Platform code lives in `posix.rs` (named semaphores) and `windows.rs`
//! (native kernel objects).

#[cfg(unix)]
mod posix;
#[cfg(unix)]
use posix::{RawEvent, RawMutex};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use self::windows::{RawEvent, RawMutex};

use crate::error::{BridgeError, PrimitiveKind, Result};
use crate::names::IpcNames;
use std::time::Duration;

/// Bounded waits used by both bridges.
pub mod timeouts {
    use std::time::Duration;

    /// Host audio thread, metadata lock.
    pub const HOST_LOCK: Duration = Duration::from_millis(10);
    /// Host audio thread, waiting for the scheduler's quantum.
    pub const HOST_HANDOFF: Duration = Duration::from_millis(10);
    /// Scheduler, waiting for the host's quantum while synced.
    pub const SCHEDULER_HANDOFF: Duration = Duration::from_secs(1);
    /// Scheduler, clearing the sync flag after a missed handoff.
    pub const SCHEDULER_DESYNC_LOCK: Duration = Duration::from_millis(100);
    /// Non-realtime control calls (state, presets, shutdown).
    pub const CONTROL: Duration = Duration::from_secs(1);
    /// Stand-in for an unbounded wait.
    pub const INFINITE: Duration = Duration::from_secs(30);
}

fn setup_error(kind: PrimitiveKind, name: &str, e: std::io::Error) -> BridgeError {
    BridgeError::Sync {
        kind,
        name: name.to_string(),
        reason: e.to_string(),
    }
}

pub struct NamedMutex {
    raw: RawMutex,
    name: String,
}

impl NamedMutex {
    pub fn create(name: &str) -> Result<Self> {
        let raw =
            RawMutex::create(name).map_err(|e| setup_error(PrimitiveKind::TransferMutex, name, e))?;
        Ok(Self {
            raw,
            name: name.to_string(),
        })
    }

    pub fn open(name: &str) -> Result<Self> {
        let raw =
            RawMutex::open(name).map_err(|e| setup_error(PrimitiveKind::TransferMutex, name, e))?;
        Ok(Self {
            raw,
            name: name.to_string(),
        })
    }

    /// Acquire within `timeout`. The lock is released when the guard drops.
    pub fn lock(&self, timeout: Duration) -> Option<TransferGuard<'_>> {
        if self.raw.lock(timeout) {
            Some(TransferGuard { mutex: self })
        } else {
            None
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unlink(name: &str) {
        RawMutex::unlink(name);
    }
}

/// Proof of holding the transfer mutex.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct TransferGuard<'a> {
    mutex: &'a NamedMutex,
}

impl TransferGuard<'_> {
    pub fn release(self) {}
}

impl Drop for TransferGuard<'_> {
    fn drop(&mut self) {
        self.mutex.raw.unlock();
    }
}

pub struct NamedEvent {
    raw: RawEvent,
    name: String,
    kind: PrimitiveKind,
}

impl NamedEvent {
    pub fn create(name: &str, kind: PrimitiveKind, signaled: bool) -> Result<Self> {
        let raw = RawEvent::create(name, signaled).map_err(|e| setup_error(kind, name, e))?;
        Ok(Self {
            raw,
            name: name.to_string(),
            kind,
        })
    }

    pub fn open(name: &str, kind: PrimitiveKind) -> Result<Self> {
        let raw = RawEvent::open(name).map_err(|e| setup_error(kind, name, e))?;
        Ok(Self {
            raw,
            name: name.to_string(),
            kind,
        })
    }

    /// Wait up to `timeout` for the signal, consuming it.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.raw.wait(timeout)
    }

    /// Set the signaled state. Signaling an already signaled event is a no-op.
    pub fn signal(&self) {
        if let Err(e) = self.raw.signal() {
            tracing::warn!(kind = %self.kind, name = %self.name, "Failed to signal: {}", e);
        }
    }

    /// Drop any pending signal.
    pub fn clear(&self) {
        self.raw.clear();
    }

    pub fn is_signaled(&self) -> bool {
        self.raw.is_signaled()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unlink(name: &str) {
        RawEvent::unlink(name);
    }
}

/// The three primitives guarding one transfer region.
pub struct TransferSync {
    pub mutex: NamedMutex,
    /// "Host has new input ready / scheduler may proceed".
    pub host_ready: NamedEvent,
    /// "Scheduler has finished one block".
    pub scheduler_ready: NamedEvent,
}

impl TransferSync {
    /// Host side. `host_ready` starts signaled so a scheduler that comes up
    /// before the first callback does not stall; `scheduler_ready` starts clear.
    /// On failure every name created so far is unlinked again.
    pub fn create(names: &IpcNames) -> Result<Self> {
        let create = || -> Result<Self> {
            Ok(Self {
                mutex: NamedMutex::create(&names.mutex)?,
                host_ready: NamedEvent::create(
                    &names.host_ready,
                    PrimitiveKind::HostReadyEvent,
                    true,
                )?,
                scheduler_ready: NamedEvent::create(
                    &names.scheduler_ready,
                    PrimitiveKind::SchedulerReadyEvent,
                    false,
                )?,
            })
        };
        create().inspect_err(|_| Self::unlink(names))
    }

    /// Scheduler side.
    pub fn open(names: &IpcNames) -> Result<Self> {
        Ok(Self {
            mutex: NamedMutex::open(&names.mutex)?,
            host_ready: NamedEvent::open(&names.host_ready, PrimitiveKind::HostReadyEvent)?,
            scheduler_ready: NamedEvent::open(
                &names.scheduler_ready,
                PrimitiveKind::SchedulerReadyEvent,
            )?,
        })
    }

    /// Remove every name. Existing handles stay usable until dropped.
    pub fn unlink(names: &IpcNames) {
        NamedMutex::unlink(&names.mutex);
        NamedEvent::unlink(&names.host_ready);
        NamedEvent::unlink(&names.scheduler_ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique(prefix: &str) -> String {
        format!(
            "{}{}x{}",
            prefix,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_mutex_excludes_second_locker() {
        let name = unique("tm");
        let mutex = NamedMutex::create(&name).unwrap();
        let other = NamedMutex::open(&name).unwrap();

        let guard = mutex.lock(Duration::from_millis(10)).unwrap();
        // Lock from another thread: native mutexes are re-entrant per thread.
        let contended = std::thread::scope(|s| {
            s.spawn(|| other.lock(Duration::from_millis(5)).is_none())
                .join()
                .unwrap()
        });
        assert!(contended);
        guard.release();
        assert!(other.lock(Duration::from_millis(10)).is_some());

        NamedMutex::unlink(&name);
    }

    #[test]
    fn test_signal_is_idempotent() {
        let name = unique("te");
        let event = NamedEvent::create(&name, PrimitiveKind::HostReadyEvent, false).unwrap();

        event.signal();
        event.signal();
        assert!(event.wait(Duration::from_millis(10)));
        assert!(!event.wait(Duration::from_millis(5)));

        NamedEvent::unlink(&name);
    }

    #[test]
    fn test_clear_drops_pending_signal() {
        let name = unique("tc");
        let event = NamedEvent::create(&name, PrimitiveKind::SchedulerReadyEvent, true).unwrap();
        assert!(event.is_signaled());
        assert!(event.is_signaled());

        event.clear();
        assert!(!event.is_signaled());
        assert!(!event.wait(Duration::ZERO));

        NamedEvent::unlink(&name);
    }

    #[test]
    fn test_event_crosses_handles() {
        let name = unique("tx");
        let creator = NamedEvent::create(&name, PrimitiveKind::HostReadyEvent, false).unwrap();
        let opener = NamedEvent::open(&name, PrimitiveKind::HostReadyEvent).unwrap();

        let waiter = std::thread::spawn(move || opener.wait(Duration::from_secs(2)));
        std::thread::sleep(Duration::from_millis(20));
        creator.signal();
        assert!(waiter.join().unwrap());

        NamedEvent::unlink(&name);
    }

    #[test]
    fn test_open_missing_reports_kind() {
        let name = unique("tmissing");
        match NamedEvent::open(&name, PrimitiveKind::SchedulerReadyEvent) {
            Err(BridgeError::Sync { kind, .. }) => {
                assert_eq!(kind, PrimitiveKind::SchedulerReadyEvent)
            }
            _ => panic!("expected a sync error"),
        }
    }

    #[test]
    fn test_transfer_sync_initial_states() {
        let instance = 900 + COUNTER.fetch_add(1, Ordering::Relaxed) as u64;
        let names = IpcNames::for_instance(std::process::id(), instance);
        let sync = TransferSync::create(&names).unwrap();
        let peer = TransferSync::open(&names).unwrap();

        assert!(peer.host_ready.wait(Duration::from_millis(10)));
        assert!(!peer.scheduler_ready.wait(Duration::ZERO));
        assert!(peer.mutex.lock(Duration::from_millis(10)).is_some());

        drop(sync);
        TransferSync::unlink(&names);
    }
}
