//! Names of the per-instance OS objects.
//!
//! Every plugin instance gets its own region and primitives, named after the
//! host process id and an instance number. Names stay short because macOS
//! caps semaphore names at 31 bytes.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique instance number for a new host-side bridge.
pub fn next_instance_id() -> u64 {
    NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcNames {
    pub host_pid: u32,
    pub region: String,
    pub mutex: String,
    pub host_ready: String,
    pub scheduler_ready: String,
}

impl IpcNames {
    pub fn for_instance(host_pid: u32, instance: u64) -> Self {
        let suffix = format!("{}x{:x}", host_pid, instance);
        Self {
            host_pid,
            region: format!("pbr{}", suffix),
            mutex: format!("pbm{}", suffix),
            host_ready: format!("pbh{}", suffix),
            scheduler_ready: format!("pbs{}", suffix),
        }
    }

    /// Names for a new instance in the current process.
    pub fn generate() -> Self {
        Self::for_instance(std::process::id(), next_instance_id())
    }
}
