//! Native named mutex and auto-reset event objects.

use std::io;
use std::time::Duration;
use windows::core::HSTRING;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_ABANDONED, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{
    CreateEventW, CreateMutexW, OpenEventW, OpenMutexW, ReleaseMutex, ResetEvent, SetEvent,
    WaitForSingleObject, EVENT_ALL_ACCESS, MUTEX_ALL_ACCESS,
};

fn to_io(e: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(e.code().0)
}

fn millis(timeout: Duration) -> u32 {
    timeout.as_millis().min(u32::MAX as u128 - 1) as u32
}

struct Handle(HANDLE);

// SAFETY: kernel object handles are usable from any thread.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

pub(crate) struct RawMutex(Handle);

impl RawMutex {
    pub(crate) fn create(name: &str) -> io::Result<Self> {
        let handle = unsafe { CreateMutexW(None, false, &HSTRING::from(name)) }.map_err(to_io)?;
        Ok(Self(Handle(handle)))
    }

    pub(crate) fn open(name: &str) -> io::Result<Self> {
        let handle =
            unsafe { OpenMutexW(MUTEX_ALL_ACCESS, false, &HSTRING::from(name)) }.map_err(to_io)?;
        Ok(Self(Handle(handle)))
    }

    pub(crate) fn lock(&self, timeout: Duration) -> bool {
        let result = unsafe { WaitForSingleObject(self.0 .0, millis(timeout)) };
        result == WAIT_OBJECT_0 || result == WAIT_ABANDONED
    }

    pub(crate) fn unlock(&self) {
        unsafe {
            let _ = ReleaseMutex(self.0 .0);
        }
    }

    /// Kernel objects vanish with their last handle.
    pub(crate) fn unlink(_name: &str) {}
}

pub(crate) struct RawEvent(Handle);

impl RawEvent {
    pub(crate) fn create(name: &str, signaled: bool) -> io::Result<Self> {
        let handle =
            unsafe { CreateEventW(None, false, signaled, &HSTRING::from(name)) }.map_err(to_io)?;
        let event = Self(Handle(handle));
        // An existing object keeps its old state when reopened by name.
        if signaled {
            event.signal()?;
        } else {
            event.clear();
        }
        Ok(event)
    }

    pub(crate) fn open(name: &str) -> io::Result<Self> {
        let handle =
            unsafe { OpenEventW(EVENT_ALL_ACCESS, false, &HSTRING::from(name)) }.map_err(to_io)?;
        Ok(Self(Handle(handle)))
    }

    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        unsafe { WaitForSingleObject(self.0 .0, millis(timeout)) == WAIT_OBJECT_0 }
    }

    pub(crate) fn signal(&self) -> io::Result<()> {
        unsafe { SetEvent(self.0 .0) }.map_err(to_io)
    }

    pub(crate) fn clear(&self) {
        unsafe {
            let _ = ResetEvent(self.0 .0);
        }
    }

    pub(crate) fn is_signaled(&self) -> bool {
        if self.wait(Duration::ZERO) {
            let _ = self.signal();
            true
        } else {
            false
        }
    }

    pub(crate) fn unlink(_name: &str) {}
}
