//! Scoped scheduling boost for the capture thread
//!
//! On Linux the calling thread's nice value is lowered while the guard is
//! alive and restored when it is dropped. Without the privilege to do so
//! (EPERM/EACCES) the thread keeps its normal priority and a warning is logged.
//! Other platforms get a no-op guard.

/// Nice value requested for the capture thread
#[cfg(target_os = "linux")]
const ELEVATED_NICE: libc::c_int = -10;

/// Restores the previous thread priority on drop
#[derive(Debug)]
pub struct ThreadPriority {
    #[cfg(target_os = "linux")]
    restore: Option<(libc::id_t, libc::c_int)>,
}

#[cfg(target_os = "linux")]
impl ThreadPriority {
    /// Raise the calling thread's priority until the guard is dropped.
    pub fn elevate() -> Self {
        // SAFETY: gettid has no preconditions and cannot fail
        let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::id_t;
        // SAFETY: plain syscalls on our own thread id
        let previous = unsafe { libc::getpriority(libc::PRIO_PROCESS, tid) };
        let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, ELEVATED_NICE) };

        if result != 0 {
            log::warn!(
                "Could not raise capture thread priority: {}",
                std::io::Error::last_os_error()
            );
            return Self { restore: None };
        }

        log::debug!(
            "Capture thread {} priority raised (nice {} -> {})",
            tid,
            previous,
            ELEVATED_NICE
        );
        Self {
            restore: Some((tid, previous)),
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.restore.is_some()
    }
}

#[cfg(target_os = "linux")]
impl Drop for ThreadPriority {
    fn drop(&mut self) {
        if let Some((tid, previous)) = self.restore.take() {
            // SAFETY: lowering our own priority back never needs privileges
            if unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, previous) } != 0 {
                log::debug!(
                    "Could not restore capture thread priority: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl ThreadPriority {
    pub fn elevate() -> Self {
        log::debug!("Thread priority elevation not supported on this platform");
        Self {}
    }

    pub fn is_elevated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_never_panics_without_privileges() {
        let handle = std::thread::spawn(|| {
            let guard = ThreadPriority::elevate();
            let _ = guard.is_elevated();
        });
        assert!(handle.join().is_ok());
    }
}
