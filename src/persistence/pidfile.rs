//! PID files
//!
//! Used for the single supervisor instance, the evening/morning job lock and
//! the managed worker processes.

use crate::error::{Result, VigilError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const LOCK_ATTEMPTS: usize = 3;
/// Wait before treating an empty lock file as abandoned
const UNREADABLE_GRACE: Duration = Duration::from_millis(50);

/// Parse the PID stored in `path`, `None` if absent or malformed
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok())
        .filter(|pid| *pid > 0)
}

/// Liveness by null signal
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            // Exists but owned by another user
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Exclusive lock held for the lifetime of the value
///
/// The file is removed on drop. A file naming a dead process is stale and
/// is reclaimed.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    pid: u32,
}

impl PidLock {
    /// Create the file exclusively; a stale or unreadable holder is removed
    /// and creation retried
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let own = std::process::id();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        for attempt in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(own.to_string().as_bytes())?;
                    file.sync_all()?;
                    debug!("Acquired lock {} (PID {})", path.display(), own);
                    return Ok(Self { path, pid: own });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            match read_pid(&path) {
                Some(existing) if existing != own && is_process_alive(existing) => {
                    return Err(VigilError::AlreadyRunning { pid: existing });
                }
                Some(existing) => {
                    warn!("Reclaiming stale lock {} (PID {})", path.display(), existing);
                }
                // The holder may not have written its PID yet
                None if attempt == 0 => {
                    std::thread::sleep(UNREADABLE_GRACE);
                    continue;
                }
                None => warn!("Reclaiming unreadable lock {}", path.display()),
            }

            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        match read_pid(&path) {
            Some(pid) => Err(VigilError::AlreadyRunning { pid }),
            None => Err(VigilError::Io(std::io::Error::new(
                ErrorKind::WouldBlock,
                format!("could not acquire {}", path.display()),
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        // Only remove the file while it still names us
        if read_pid(&self.path) == Some(self.pid) {
            let _ = fs::remove_file(&self.path);
        }
    }
}
