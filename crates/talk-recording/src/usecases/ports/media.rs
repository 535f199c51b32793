//! Resources a recording session acquires, in acquisition order: virtual
//! display, audio sink, participant client, recorder process.
//!
//! Handles are shared (`Arc`) because a stop request tears them down from a
//! different thread than the one that acquired them, possibly while that
//! thread is still blocked on the same handle.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::MediaError;
use crate::domain::MediaMode;
use crate::domain::VideoSize;

pub trait DisplayHandle: Send + Sync {
    /// X display name, e.g. `:99`.
    fn display_name(&self) -> String;
    fn release(&self) -> Result<(), MediaError>;
}

pub trait AudioSinkHandle: Send + Sync {
    /// Identifier the participant and the recorder use to address the sink.
    fn sink_id(&self) -> String;
    fn release(&self) -> Result<(), MediaError>;
}

pub trait ParticipantHandle: Send + Sync {
    /// Joins the call. May block until the client is in the call.
    fn join_call(&self, token: &str) -> Result<(), MediaError>;
    fn disconnect(&self) -> Result<(), MediaError>;
}

pub trait RecorderHandle: Send + Sync {
    /// Blocks until the recorder process exits.
    fn wait(&self) -> Result<RecorderExit, MediaError>;
    /// Asks the recorder to finish and waits for it.
    fn terminate(&self) -> Result<(), MediaError>;
}

/// Exit status of the recorder process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderExit {
    /// `None` when the process was killed by a signal it did not handle.
    pub code: Option<i32>,
}

impl RecorderExit {
    /// Exit code the recorder uses after a graceful terminate request.
    pub const TERMINATED_INTENTIONALLY: i32 = 255;

    pub fn is_intentional_termination(&self) -> bool {
        self.code == Some(Self::TERMINATED_INTENTIONALLY)
    }
}

impl fmt::Display for RecorderExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "no exit code (killed by signal)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParticipantRequest<'a> {
    pub backend: &'a str,
    pub display: &'a str,
    pub audio_sink: &'a str,
    pub video_size: VideoSize,
}

#[derive(Debug, Clone)]
pub struct RecorderRequest<'a> {
    pub media_mode: MediaMode,
    pub display: &'a str,
    pub audio_sink: &'a str,
    pub video_size: VideoSize,
    pub output: &'a Path,
}

pub trait MediaEnvironment: Send + Sync {
    fn acquire_display(&self, size: VideoSize) -> Result<Arc<dyn DisplayHandle>, MediaError>;

    /// Creates a sink private to one session so that concurrent recordings do
    /// not mix their audio. `base_name` is already sanitized.
    fn acquire_audio_sink(&self, base_name: &str) -> Result<Arc<dyn AudioSinkHandle>, MediaError>;

    fn launch_participant(
        &self,
        request: &ParticipantRequest<'_>,
    ) -> Result<Arc<dyn ParticipantHandle>, MediaError>;

    /// File extension (with leading dot) of recordings in `mode`.
    fn recording_extension(&self, mode: MediaMode) -> String;

    fn launch_recorder(
        &self,
        request: &RecorderRequest<'_>,
    ) -> Result<Arc<dyn RecorderHandle>, MediaError>;
}
