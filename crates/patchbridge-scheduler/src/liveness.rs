//! Host process liveness probe.

#[derive(Debug, Clone, Copy)]
pub struct HostProbe {
    pid: u32,
}

impl HostProbe {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        // 0 and values that wrap negative address process groups.
        let Ok(pid) = libc::pid_t::try_from(self.pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        // Exists, but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(windows)]
    pub fn is_alive(&self) -> bool {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };
        const STILL_ACTIVE: u32 = 259;

        if self.pid == 0 {
            return false;
        }
        unsafe {
            let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, self.pid) else {
                return false;
            };
            let mut code = 0u32;
            let alive = GetExitCodeProcess(handle, &mut code).is_ok() && code == STILL_ACTIVE;
            let _ = CloseHandle(handle);
            alive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(HostProbe::new(std::process::id()).is_alive());
    }

    #[test]
    fn test_invalid_pids_are_dead() {
        assert!(!HostProbe::new(0).is_alive());
        assert!(!HostProbe::new(u32::MAX).is_alive());
    }
}
