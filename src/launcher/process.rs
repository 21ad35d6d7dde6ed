//! PID-file managed child process

use super::WorkerControl;
use crate::error::{Result, VigilError};
use crate::persistence::{is_process_alive, read_pid};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Launch recipe for one managed process
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub command: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub log_file: PathBuf,
    pub env: Vec<(String, String)>,
}

/// A long-running child identified by its PID file
///
/// The PID file makes the process visible to every `vigil` invocation; the
/// child handle, when this instance spawned it, is reaped so an exited
/// worker is not left as a zombie that still answers the null signal.
pub struct ManagedProcess {
    spec: ProcessSpec,
    pid_file: PathBuf,
    stop_grace: Duration,
    child: Mutex<Option<Child>>,
}

impl ManagedProcess {
    pub fn new(spec: ProcessSpec, run_dir: &Path, stop_grace: Duration) -> Self {
        let pid_file = run_dir.join(format!("{}.pid", spec.name));
        Self {
            spec,
            pid_file,
            stop_grace,
            child: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// PID of the live process, cleaning up a stale PID file
    pub async fn running_pid(&self) -> Option<u32> {
        {
            let mut child = self.child.lock().await;
            if let Some(ref mut handle) = *child {
                match handle.try_wait() {
                    Ok(Some(status)) => {
                        info!("{} exited with {}", self.spec.name, status);
                        *child = None;
                    }
                    Ok(None) => {}
                    Err(e) => debug!("try_wait on {} failed: {}", self.spec.name, e),
                }
            }
        }

        let pid = read_pid(&self.pid_file)?;
        if is_process_alive(pid) {
            Some(pid)
        } else {
            debug!("Removing stale PID file {}", self.pid_file.display());
            let _ = fs::remove_file(&self.pid_file);
            None
        }
    }

    async fn spawn(&self) -> Result<u32> {
        let (program, args) = self.spec.command.split_first().ok_or_else(|| {
            VigilError::InvalidConfig(format!("{} command is empty", self.spec.name))
        })?;

        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(parent) = self.spec.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Redirect output to log file
        let log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.spec.log_file)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .stdin(Stdio::null());
        if let Some(ref dir) = self.spec.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.spec.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| {
            VigilError::Process(format!("failed to spawn {} ({}): {}", self.spec.name, program, e))
        })?;
        let pid = child
            .id()
            .ok_or_else(|| VigilError::Process(format!("{} exited immediately", self.spec.name)))?;

        fs::write(&self.pid_file, pid.to_string())?;
        *self.child.lock().await = Some(child);

        info!(
            "{} started (PID: {}), log: {}",
            self.spec.name,
            pid,
            self.spec.log_file.display()
        );
        Ok(pid)
    }

    async fn terminate(&self, pid: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            info!("Stopping {} (PID: {}) with SIGTERM", self.spec.name, pid);
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("SIGTERM to {} failed: {}", pid, e);
            }

            let deadline = tokio::time::Instant::now() + self.stop_grace;
            while tokio::time::Instant::now() < deadline {
                if self.running_pid().await.is_none() {
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }

            warn!("{} ignored SIGTERM, sending SIGKILL", self.spec.name);
            kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
                .map_err(|e| VigilError::Process(format!("SIGKILL to {} failed: {}", pid, e)))?;

            if let Some(mut child) = self.child.lock().await.take() {
                let _ = child.wait().await;
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            let _ = pid;
            Err(VigilError::Process(
                "signal handling not supported on this platform".to_string(),
            ))
        }
    }
}

#[async_trait]
impl WorkerControl for ManagedProcess {
    async fn is_alive(&self) -> bool {
        self.running_pid().await.is_some()
    }

    /// Idempotent: returns the existing PID when already running
    async fn start(&self) -> Result<u32> {
        if let Some(pid) = self.running_pid().await {
            debug!("{} already running (PID: {})", self.spec.name, pid);
            return Ok(pid);
        }
        self.spawn().await
    }

    async fn stop(&self) -> Result<()> {
        let Some(pid) = self.running_pid().await else {
            debug!("{} is not running", self.spec.name);
            return Ok(());
        };

        self.terminate(pid).await?;
        let _ = fs::remove_file(&self.pid_file);
        info!("{} stopped", self.spec.name);
        Ok(())
    }
}
