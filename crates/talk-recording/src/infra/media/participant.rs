//! Participant client that joins the call and plays its audio and video.
//!
//! The client is an external program (a browser by default) started on
//! the session display with the call URL as its last argument.

use std::process::Command;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::process::ManagedProcess;
use crate::common::mutex_lock_or_recover;
use crate::domain::VideoSize;
use crate::usecases::ports::MediaError;
use crate::usecases::ports::ParticipantHandle;

pub const SIGNALING_SECRET_ENV: &str = "TALK_RECORDING_SIGNALING_SECRET";
pub const BACKEND_URL_ENV: &str = "TALK_RECORDING_BACKEND_URL";

const STARTUP_GRACE: Duration = Duration::from_secs(2);
const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ParticipantLaunch {
    pub command: Vec<String>,
    pub backend: String,
    pub display: String,
    pub audio_sink: String,
    pub video_size: VideoSize,
    pub signaling_secret: Option<String>,
}

pub struct ParticipantClient {
    launch: ParticipantLaunch,
    process: Mutex<Option<ManagedProcess>>,
}

/// `<backend>/index.php/call/<token>/recording`
pub fn call_url(backend: &str, token: &str) -> String {
    format!("{}/index.php/call/{token}/recording", backend.trim_end_matches('/'))
}

impl ParticipantClient {
    pub fn new(launch: ParticipantLaunch) -> Result<Self, MediaError> {
        if launch.command.is_empty() {
            return Err(MediaError::command("launch participant", "empty command"));
        }
        Ok(Self {
            launch,
            process: Mutex::new(None),
        })
    }

    fn command(&self, token: &str) -> Command {
        let launch = &self.launch;
        let mut command = Command::new(&launch.command[0]);
        command
            .args(&launch.command[1..])
            .arg(call_url(&launch.backend, token))
            .env("DISPLAY", &launch.display)
            .env("PULSE_SINK", &launch.audio_sink)
            .env(BACKEND_URL_ENV, &launch.backend)
            .env("TALK_RECORDING_WIDTH", launch.video_size.width.to_string())
            .env("TALK_RECORDING_HEIGHT", launch.video_size.height.to_string());
        if let Some(secret) = &launch.signaling_secret {
            command.env(SIGNALING_SECRET_ENV, secret);
        }
        command
    }
}

impl ParticipantHandle for ParticipantClient {
    fn join_call(&self, token: &str) -> Result<(), MediaError> {
        let process = ManagedProcess::spawn(format!("participant-{token}"), self.command(token))?;

        thread::sleep(STARTUP_GRACE);
        if let Some(status) = process.try_status()? {
            return Err(MediaError::NotReady {
                resource: "participant",
                reason: format!("client exited with {status}"),
            });
        }

        debug!(token, pid = process.pid(), "Participant joined call");
        *mutex_lock_or_recover(&self.process) = Some(process);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), MediaError> {
        let process = mutex_lock_or_recover(&self.process).take();
        match process {
            Some(process) => process.terminate(STOP_GRACE),
            None => Ok(()),
        }
    }
}
