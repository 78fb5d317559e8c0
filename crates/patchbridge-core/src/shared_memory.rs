//! Memory-mapped transfer region shared between the host and the scheduler.

use crate::error::{BridgeError, Result};
use crate::layout::{SessionParams, TransferRegion};
use memmap2::MmapMut;
use std::cell::UnsafeCell;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// A [`TransferRegion`] mapped from a named backing file.
///
/// Uses `UnsafeCell` because both processes write the region through their
/// own mapping. Mailbox fields are only touched while holding the transfer
/// mutex; the sample arrays are only touched between the two handoff events.
pub struct TransferMap {
    mmap: UnsafeCell<MmapMut>,
    name: String,
    /// Creator owns the backing file and removes it on drop.
    owns_memory: bool,
}

impl TransferMap {
    /// Create (or recreate) the backing file, zero it and stamp the session values.
    pub fn create(name: &str, session: &SessionParams) -> Result<Self> {
        let path = Self::backing_path(name);

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let file = options.open(&path).map_err(|e| {
            BridgeError::SharedMemory(format!(
                "Failed to create shared memory file {}: {}",
                path.display(),
                e
            ))
        })?;

        file.set_len(TransferRegion::SIZE as u64).map_err(|e| {
            BridgeError::SharedMemory(format!("Failed to set file size: {}", e))
        })?;

        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            BridgeError::SharedMemory(format!("Failed to create memory map: {}", e))
        })?;

        let map = Self {
            mmap: UnsafeCell::new(mmap),
            name: name.to_string(),
            owns_memory: true,
        };
        // SAFETY: nobody else has the name yet.
        unsafe { map.region_mut() }.initialize(session);

        tracing::debug!(name, size = TransferRegion::SIZE, "Created transfer region");
        Ok(map)
    }

    /// Map an existing region created by the host.
    pub fn open(name: &str) -> Result<Self> {
        let path = Self::backing_path(name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                BridgeError::SharedMemory(format!(
                    "Failed to open shared memory file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let len = file.metadata()?.len();
        if len < TransferRegion::SIZE as u64 {
            return Err(BridgeError::SharedMemory(format!(
                "Region '{}' is {} bytes, expected {}",
                name,
                len,
                TransferRegion::SIZE
            )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            BridgeError::SharedMemory(format!("Failed to open memory map: {}", e))
        })?;

        let map = Self {
            mmap: UnsafeCell::new(mmap),
            name: name.to_string(),
            owns_memory: false,
        };
        if !map.region().is_valid_layout() {
            return Err(BridgeError::SharedMemory(format!(
                "Region '{}' has an incompatible layout",
                name
            )));
        }
        Ok(map)
    }

    pub fn region(&self) -> &TransferRegion {
        // SAFETY: the mapping is page aligned and at least `TransferRegion::SIZE` long;
        // every bit pattern of the region is a valid value.
        unsafe { &*((*self.mmap.get()).as_ptr() as *const TransferRegion) }
    }

    /// # Safety
    ///
    /// The caller must hold the transfer mutex (for mailbox fields) or be
    /// inside its side of the handoff (for sample arrays), and must not keep
    /// another reference from this map alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn region_mut(&self) -> &mut TransferRegion {
        unsafe { &mut *((*self.mmap.get()).as_mut_ptr() as *mut TransferRegion) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owns_memory(&self) -> bool {
        self.owns_memory
    }

    /// Remove a region's backing file. Used by whichever side notices the host is gone.
    pub fn unlink(name: &str) {
        let _ = std::fs::remove_file(Self::backing_path(name));
    }

    fn backing_path(name: &str) -> PathBuf {
        #[cfg(target_os = "linux")]
        let base = PathBuf::from("/dev/shm");

        #[cfg(not(target_os = "linux"))]
        let base = std::env::temp_dir();

        base.join(format!("patchbridge_{}", name))
    }
}

// SAFETY: access discipline is enforced by the named mutex and handoff events.
unsafe impl Send for TransferMap {}
unsafe impl Sync for TransferMap {}

impl Drop for TransferMap {
    fn drop(&mut self) {
        if self.owns_memory {
            Self::unlink(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Direction;
    use crate::layout::ParameterValue;

    #[test]
    fn test_create_initializes_region() {
        let name = format!("test_region_init_{}", std::process::id());
        let session = SessionParams {
            channels_in: 4,
            channels_out: 2,
            sample_rate: 44100,
            block_size: 64,
            parameter_count: 8,
        };
        let map = TransferMap::create(&name, &session).unwrap();
        let region = map.region();

        assert!(region.is_active());
        assert!(!region.sync_to_host());
        assert_eq!(region.channels_in(), 4);
        assert_eq!(region.channels_out(), 2);
        assert_eq!(region.sample_rate(), 44100);
        assert_eq!(region.block_size(), 64);
        assert_eq!(region.parameter_count(), 8);
        assert!(!region.midi_in.is_updated());
    }

    #[test]
    fn test_open_sees_writes() {
        let name = format!("test_region_shared_{}", std::process::id());
        let host = TransferMap::create(&name, &SessionParams::default()).unwrap();
        let scheduler = TransferMap::open(&name).unwrap();
        assert!(!scheduler.owns_memory());

        unsafe {
            host.region_mut().parameters[3].post(Direction::ToScheduler, ParameterValue::float(0.5));
            host.region_mut().samples_out[1][10] = 0.25;
        }

        let value = unsafe { scheduler.region_mut() }.parameters[3].take(Direction::ToScheduler);
        assert_eq!(value.and_then(|v| v.as_float()), Some(0.5));
        assert_eq!(scheduler.region().samples_out[1][10], 0.25);
        assert!(!host.region().parameters[3].is_pending(Direction::ToScheduler));
    }

    #[test]
    fn test_creator_removes_backing_file() {
        let name = format!("test_region_drop_{}", std::process::id());
        {
            let _map = TransferMap::create(&name, &SessionParams::default()).unwrap();
            assert!(TransferMap::backing_path(&name).exists());
        }
        assert!(!TransferMap::backing_path(&name).exists());
        assert!(TransferMap::open(&name).is_err());
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let name = format!("test_region_foreign_{}", std::process::id());
        let path = TransferMap::backing_path(&name);
        std::fs::write(&path, vec![0u8; TransferRegion::SIZE]).unwrap();

        let result = TransferMap::open(&name);
        TransferMap::unlink(&name);
        assert!(matches!(result, Err(BridgeError::SharedMemory(_))));
    }
}
