//! Host resource sampling

use std::path::PathBuf;
use tracing::debug;

const MIB: u64 = 1024 * 1024;

/// One sample; `None` where the probe could not read a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub disk_pct: Option<u8>,
    pub memory_pct: Option<u8>,
    /// Rounded up, so any size over the threshold compares greater
    pub log_mb: Option<u64>,
}

pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> ResourceUsage;
}

/// Disk via statvfs, memory via /proc/meminfo, log size via file metadata
#[derive(Debug, Clone)]
pub struct SystemResources {
    disk_path: PathBuf,
    log_file: PathBuf,
}

impl SystemResources {
    pub fn new(disk_path: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self {
        Self {
            disk_path: disk_path.into(),
            log_file: log_file.into(),
        }
    }

    fn disk_pct(&self) -> Option<u8> {
        #[cfg(unix)]
        {
            let stat = match nix::sys::statvfs::statvfs(&self.disk_path) {
                Ok(stat) => stat,
                Err(e) => {
                    debug!("statvfs({}) failed: {}", self.disk_path.display(), e);
                    return None;
                }
            };
            // Same arithmetic as df: reserved blocks count as unavailable
            let used = (stat.blocks() as u64).saturating_sub(stat.blocks_free() as u64);
            let usable = used + stat.blocks_available() as u64;
            percent(used, usable)
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    fn memory_pct(&self) -> Option<u8> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&meminfo)
    }

    fn log_mb(&self) -> Option<u64> {
        match std::fs::metadata(&self.log_file) {
            Ok(meta) => Some(meta.len().div_ceil(MIB)),
            // No log yet means nothing to rotate
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Some(0),
            Err(e) => {
                debug!("stat({}) failed: {}", self.log_file.display(), e);
                None
            }
        }
    }
}

impl ResourceProbe for SystemResources {
    fn sample(&self) -> ResourceUsage {
        ResourceUsage {
            disk_pct: self.disk_pct(),
            memory_pct: self.memory_pct(),
            log_mb: self.log_mb(),
        }
    }
}

fn percent(part: u64, whole: u64) -> Option<u8> {
    if whole == 0 {
        return None;
    }
    Some(((part as f64 / whole as f64) * 100.0).round().min(100.0) as u8)
}

/// Used = MemTotal - MemAvailable
fn parse_meminfo(meminfo: &str) -> Option<u8> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|value| value.parse().ok())
    };

    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    percent(total.saturating_sub(available), total)
}
