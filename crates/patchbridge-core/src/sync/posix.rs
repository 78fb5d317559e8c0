//! Named POSIX semaphores standing in for a mutex and auto-reset events.

use std::ffi::CString;
use std::io;
use std::time::Duration;

pub(crate) struct Semaphore {
    sem: *mut libc::sem_t,
}

// SAFETY: a named semaphore handle is usable from any thread.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

fn sem_name(name: &str) -> io::Result<CString> {
    CString::new(format!("/{}", name)).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

impl Semaphore {
    /// Create a fresh semaphore, replacing any stale one left under the same name.
    pub(crate) fn create(name: &str, initial: u32) -> io::Result<Self> {
        let c_name = sem_name(name)?;
        unsafe { libc::sem_unlink(c_name.as_ptr()) };

        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { sem })
    }

    pub(crate) fn open(name: &str) -> io::Result<Self> {
        let c_name = sem_name(name)?;
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { sem })
    }

    pub(crate) fn unlink(name: &str) {
        if let Ok(c_name) = sem_name(name) {
            unsafe { libc::sem_unlink(c_name.as_ptr()) };
        }
    }

    pub(crate) fn try_wait(&self) -> bool {
        unsafe { libc::sem_trywait(self.sem) == 0 }
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.try_wait();
        }

        let mut now: libc::timespec = unsafe { std::mem::zeroed() };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };

        let nanos = now.tv_nsec as i64 + timeout.subsec_nanos() as i64;
        let mut deadline: libc::timespec = unsafe { std::mem::zeroed() };
        deadline.tv_sec = now.tv_sec + timeout.as_secs() as libc::time_t + (nanos / 1_000_000_000) as libc::time_t;
        deadline.tv_nsec = (nanos % 1_000_000_000) as _;

        loop {
            if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
                return true;
            }
            if io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
                return false;
            }
        }
    }

    /// No cross-process timed wait on this platform: poll every 10µs.
    #[cfg(not(target_os = "linux"))]
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.try_wait() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_micros(10));
        }
    }

    pub(crate) fn post(&self) -> io::Result<()> {
        if unsafe { libc::sem_post(self.sem) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Post only if the count is zero, so the count never exceeds one.
    #[cfg(target_os = "linux")]
    pub(crate) fn post_once(&self) -> io::Result<()> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem, &mut value) } != 0 {
            return Err(io::Error::last_os_error());
        }
        if value == 0 {
            self.post()?;
        }
        Ok(())
    }

    /// `sem_getvalue` is not available here: take one (if any) and post it back.
    #[cfg(not(target_os = "linux"))]
    pub(crate) fn post_once(&self) -> io::Result<()> {
        self.try_wait();
        self.post()
    }

    pub(crate) fn drain(&self) {
        while self.try_wait() {}
    }

    pub(crate) fn is_posted(&self) -> bool {
        if self.try_wait() {
            let _ = self.post();
            true
        } else {
            false
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.sem) };
    }
}

/// Binary semaphore with an initial count of one.
pub(crate) struct RawMutex(Semaphore);

impl RawMutex {
    pub(crate) fn create(name: &str) -> io::Result<Self> {
        Semaphore::create(name, 1).map(Self)
    }

    pub(crate) fn open(name: &str) -> io::Result<Self> {
        Semaphore::open(name).map(Self)
    }

    pub(crate) fn lock(&self, timeout: Duration) -> bool {
        self.0.wait(timeout)
    }

    pub(crate) fn unlock(&self) {
        let _ = self.0.post();
    }

    pub(crate) fn unlink(name: &str) {
        Semaphore::unlink(name);
    }
}

/// Event emulated on a counting semaphore kept at zero or one.
pub(crate) struct RawEvent(Semaphore);

impl RawEvent {
    pub(crate) fn create(name: &str, signaled: bool) -> io::Result<Self> {
        Semaphore::create(name, signaled as u32).map(Self)
    }

    pub(crate) fn open(name: &str) -> io::Result<Self> {
        Semaphore::open(name).map(Self)
    }

    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        self.0.wait(timeout)
    }

    pub(crate) fn signal(&self) -> io::Result<()> {
        self.0.post_once()
    }

    pub(crate) fn clear(&self) {
        self.0.drain();
    }

    pub(crate) fn is_signaled(&self) -> bool {
        self.0.is_posted()
    }

    pub(crate) fn unlink(name: &str) {
        Semaphore::unlink(name);
    }
}
