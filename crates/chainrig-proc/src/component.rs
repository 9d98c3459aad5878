//! A component backed by an OS process.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chainrig_core::{Runnable, RunnableError, RunnableResult};
#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ProcessError, ProcessResult};
use crate::probe;
use crate::spec::ProcessSpec;

/// Spawns `spec.binary` with stdout and stderr appended to
/// `<log_dir>/<name>.log`. The child is killed when the component is dropped.
pub struct ProcessComponent {
    name: String,
    spec: ProcessSpec,
    log_path: PathBuf,
    http: reqwest::Client,
    child: Mutex<Option<Child>>,
}

impl ProcessComponent {
    /// `spec` must already have its placeholders resolved.
    pub fn new(name: impl Into<String>, spec: ProcessSpec, log_dir: &Path) -> Self {
        let name = name.into();
        let log_path = log_dir.join(format!("{name}.log"));
        Self {
            name,
            spec,
            log_path,
            http: probe::probe_client(),
            child: Mutex::new(None),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open_log(&self) -> ProcessResult<(File, File)> {
        let log_err = |source| ProcessError::LogFile {
            path: self.log_path.clone(),
            source,
        };
        if let Some(dir) = self.log_path.parent() {
            fs::create_dir_all(dir).map_err(log_err)?;
        }
        let out = File::options()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(log_err)?;
        let err = out.try_clone().map_err(log_err)?;
        Ok((out, err))
    }

    fn spawn(&self) -> ProcessResult<Child> {
        if self.spec.binary.as_os_str().is_empty() {
            return Err(ProcessError::InvalidSpec {
                component: self.name.clone(),
                reason: "binary is empty".to_string(),
            });
        }
        let (stdout, stderr) = self.open_log()?;

        let mut cmd = Command::new(&self.spec.binary);
        cmd.args(self.spec.argv())
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.spawn().map_err(|source| ProcessError::Spawn {
            component: self.name.clone(),
            binary: self.spec.binary.clone(),
            source,
        })
    }

    /// `Err(Exited)` if the child has terminated on its own.
    fn check_alive(&self) -> RunnableResult<bool> {
        let mut guard = self.lock();
        let Some(child) = guard.as_mut() else {
            return Ok(false);
        };
        match child.try_wait() {
            Ok(None) => Ok(true),
            Ok(Some(status)) => Err(RunnableError::Exited {
                component: self.name.clone(),
                status: status.to_string(),
            }),
            Err(source) => Err(RunnableError::Io {
                component: self.name.clone(),
                source,
            }),
        }
    }

    #[cfg(unix)]
    fn signal(&self, signal: Signal) -> RunnableResult<()> {
        let pid = self.pid().ok_or_else(|| RunnableError::Misconfigured {
            component: self.name.clone(),
            reason: "process is not running".to_string(),
        })?;
        let signal_err = |reason: String| ProcessError::Signal {
            component: self.name.clone(),
            signal: signal.as_str(),
            reason,
        };
        let raw = i32::try_from(pid).map_err(|_| signal_err(format!("pid {pid} out of range")))?;
        kill(Pid::from_raw(raw), signal).map_err(|errno| signal_err(errno.to_string()))?;
        debug!(component = %self.name, pid, signal = signal.as_str(), "signal sent");
        Ok(())
    }
}

#[async_trait]
impl Runnable for ProcessComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, cancel: &CancellationToken) -> RunnableResult<()> {
        if cancel.is_cancelled() {
            return Err(RunnableError::Cancelled {
                component: self.name.clone(),
            });
        }
        let child = self.spawn()?;
        info!(
            component = %self.name,
            pid = ?child.id(),
            log = %self.log_path.display(),
            "process spawned"
        );
        *self.lock() = Some(child);
        Ok(())
    }

    async fn is_started(&self, _cancel: &CancellationToken) -> RunnableResult<bool> {
        if !self.check_alive()? {
            return Ok(false);
        }
        Ok(probe::check(&self.spec.readiness, &self.log_path, &self.http).await)
    }

    async fn stop(&self) -> RunnableResult<()> {
        let Some(mut child) = self.lock().take() else {
            return Ok(());
        };
        if let Ok(Some(status)) = child.try_wait() {
            debug!(component = %self.name, %status, "already exited");
            return Ok(());
        }
        if let Err(source) = child.kill().await {
            warn!(component = %self.name, error = %source, "kill failed");
            return Err(RunnableError::Io {
                component: self.name.clone(),
                source,
            });
        }
        info!(component = %self.name, "process stopped");
        Ok(())
    }

    #[cfg(unix)]
    async fn pause(&self) -> RunnableResult<()> {
        self.signal(Signal::SIGSTOP)
    }

    #[cfg(unix)]
    async fn resume(&self) -> RunnableResult<()> {
        self.signal(Signal::SIGCONT)
    }

    fn pid(&self) -> Option<u32> {
        self.lock().as_ref().and_then(Child::id)
    }
}
