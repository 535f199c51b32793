//! Child processes owned by a recording session.
//!
//! The exit status is only ever collected under the child lock, so a signal
//! sent by pid can never reach a recycled pid.

use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::process::Child;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::common::mutex_lock_or_recover;
use crate::usecases::ports::MediaError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ManagedProcess {
    name: String,
    pid: u32,
    child: Mutex<Child>,
}

impl ManagedProcess {
    /// Spawns `command` with its output forwarded to the log.
    pub fn spawn(name: impl Into<String>, mut command: Command) -> Result<Self, MediaError> {
        let name = name.into();
        let program = command.get_program().to_string_lossy().into_owned();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .map_err(|source| MediaError::Spawn { program, source })?;
        let pid = child.id();
        debug!(process = %name, pid, "Process started");

        if let Some(stdout) = child.stdout.take() {
            forward_output(&name, "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(&name, "stderr", stderr);
        }

        Ok(Self {
            name,
            pid,
            child: Mutex::new(child),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn try_status(&self) -> Result<Option<ExitStatus>, MediaError> {
        mutex_lock_or_recover(&self.child)
            .try_wait()
            .map_err(|source| MediaError::Io {
                operation: "poll process",
                source,
            })
    }

    /// Blocks until the process exits.
    pub fn wait(&self) -> Result<ExitStatus, MediaError> {
        loop {
            if let Some(status) = self.try_status()? {
                return Ok(status);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> Result<Option<ExitStatus>, MediaError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_status()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Sends SIGTERM and waits up to `grace` for the process to exit before
    /// killing it.
    pub fn terminate(&self, grace: Duration) -> Result<(), MediaError> {
        {
            let mut child = mutex_lock_or_recover(&self.child);
            let exited = child.try_wait().map_err(|source| MediaError::Io {
                operation: "poll process",
                source,
            })?;
            if exited.is_some() {
                return Ok(());
            }
            send_sigterm(self.pid)?;
        }

        if let Some(status) = self.wait_timeout(grace)? {
            debug!(process = %self.name, pid = self.pid, %status, "Process terminated");
            return Ok(());
        }

        warn!(process = %self.name, pid = self.pid, "Process ignored SIGTERM, killing it");
        let mut child = mutex_lock_or_recover(&self.child);
        child.kill().map_err(|source| MediaError::Io {
            operation: "kill process",
            source,
        })?;
        child.wait().map_err(|source| MediaError::Io {
            operation: "wait process",
            source,
        })?;
        Ok(())
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        let child = self.child.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn send_sigterm(pid: u32) -> Result<(), MediaError> {
    let pid_t: libc::pid_t = pid.try_into().map_err(|_| {
        MediaError::command("terminate process", format!("pid {pid} out of range"))
    })?;
    // SAFETY: `kill` has no memory safety requirements; the pid belongs to an
    // unreaped child, so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid_t, libc::SIGTERM) };
    if rc == -1 {
        return Err(MediaError::Io {
            operation: "signal process",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn forward_output(name: &str, stream: &'static str, pipe: impl Read + Send + 'static) {
    let process = name.to_string();
    let spawned = thread::Builder::new()
        .name(format!("{name}-{stream}"))
        .spawn(move || {
            for line in BufReader::new(pipe).lines() {
                match line {
                    Ok(line) => info!(process = %process, stream, "{line}"),
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = spawned {
        warn!(process = %name, error = %e, "Failed to forward process output");
    }
}
