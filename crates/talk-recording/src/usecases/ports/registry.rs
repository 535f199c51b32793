use crate::domain::Actor;
use crate::domain::SessionKey;
use crate::domain::StartCommand;

use super::RegistryError;

/// Where a tracked session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
    /// A previous recording of the same call is still being stopped.
    StillStopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopping,
    AlreadyStopping,
}

/// Owns the mapping from call to recording session.
///
/// Both operations return as soon as the registry has been updated; the
/// session work runs on worker threads.
pub trait RecordingRegistry: Send + Sync {
    fn start_recording(
        &self,
        key: SessionKey,
        command: StartCommand,
    ) -> Result<StartOutcome, RegistryError>;

    fn stop_recording(
        &self,
        key: SessionKey,
        actor: Option<Actor>,
    ) -> Result<StopOutcome, RegistryError>;

    fn session_count(&self) -> usize;

    /// Tears down every active session without notifying the backend.
    fn abort_all(&self);
}
