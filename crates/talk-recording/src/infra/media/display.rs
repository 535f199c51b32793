//! Virtual X display backed by Xvfb.

use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;

use super::process::ManagedProcess;
use crate::domain::VideoSize;
use crate::usecases::ports::DisplayHandle;
use crate::usecases::ports::MediaError;

const FIRST_DISPLAY: u32 = 100;
const DISPLAY_RANGE: u32 = 1000;
const READY_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_GRACE: Duration = Duration::from_secs(5);
const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";

static NEXT_DISPLAY: AtomicU32 = AtomicU32::new(0);

pub struct XvfbDisplay {
    number: u32,
    process: ManagedProcess,
}

fn socket_path(number: u32) -> PathBuf {
    Path::new(X11_SOCKET_DIR).join(format!("X{number}"))
}

fn lock_path(number: u32) -> PathBuf {
    PathBuf::from(format!("/tmp/.X{number}-lock"))
}

/// Next display number without a socket or lock file. Numbers are handed out
/// round-robin so concurrent sessions do not race for the same one.
fn free_display_number() -> Result<u32, MediaError> {
    for _ in 0..DISPLAY_RANGE {
        let number = FIRST_DISPLAY + NEXT_DISPLAY.fetch_add(1, Ordering::SeqCst) % DISPLAY_RANGE;
        if !socket_path(number).exists() && !lock_path(number).exists() {
            return Ok(number);
        }
    }
    Err(MediaError::NotReady {
        resource: "display",
        reason: "no free display number".to_string(),
    })
}

pub fn xvfb_args(number: u32, size: VideoSize) -> Vec<String> {
    vec![
        format!(":{number}"),
        "-screen".to_string(),
        "0".to_string(),
        format!("{size}x24"),
        "-nolisten".to_string(),
        "tcp".to_string(),
    ]
}

impl XvfbDisplay {
    pub fn start(size: VideoSize) -> Result<Self, MediaError> {
        let number = free_display_number()?;
        let mut command = Command::new("Xvfb");
        command.args(xvfb_args(number, size));
        let process = ManagedProcess::spawn(format!("xvfb-{number}"), command)?;
        let display = Self { number, process };
        display.wait_ready()?;
        debug!(display = number, %size, "Display started");
        Ok(display)
    }

    fn wait_ready(&self) -> Result<(), MediaError> {
        let deadline = Instant::now() + READY_TIMEOUT;
        let socket = socket_path(self.number);
        loop {
            if let Some(status) = self.process.try_status()? {
                return Err(MediaError::NotReady {
                    resource: "display",
                    reason: format!("Xvfb exited with {status}"),
                });
            }
            if socket.exists() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MediaError::NotReady {
                    resource: "display",
                    reason: format!("{} did not appear", socket.display()),
                });
            }
            thread::sleep(Duration::from_millis(50));
        }
    }
}

impl DisplayHandle for XvfbDisplay {
    fn display_name(&self) -> String {
        format!(":{}", self.number)
    }

    fn release(&self) -> Result<(), MediaError> {
        debug!(display = self.number, "Stopping display");
        self.process.terminate(STOP_GRACE)
    }
}
