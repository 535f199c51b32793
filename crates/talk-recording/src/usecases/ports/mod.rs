pub mod backend_notifier;
pub mod errors;
pub mod media;
pub mod registry;
pub mod settings;
pub mod shutdown_notifier;
#[cfg(test)]
pub(crate) mod test_support;

pub use backend_notifier::BackendNotifier;
pub use errors::{MediaError, NotifyError, RecordingError, RegistryError};
pub use media::{
    AudioSinkHandle, DisplayHandle, MediaEnvironment, ParticipantHandle, ParticipantRequest,
    RecorderExit, RecorderHandle, RecorderRequest,
};
pub use registry::{RecordingRegistry, SessionPhase, StartOutcome, StopOutcome};
pub use settings::{BackendSettings, GatewaySettings};
pub use shutdown_notifier::{ShutdownNotifier, ShutdownNotifierHandle};
