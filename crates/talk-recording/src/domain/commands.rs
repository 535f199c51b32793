//! Commands accepted from the call backend, after validation.

use super::Actor;
use super::MediaMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCommand {
    pub media_mode: MediaMode,
    /// User the uploaded recording is attributed to.
    pub owner: String,
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCommand {
    pub actor: Option<Actor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingCommand {
    Start(StartCommand),
    Stop(StopCommand),
}
