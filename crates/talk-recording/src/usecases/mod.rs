mod recording_session;

pub use recording_session::RecordingSession;
pub use recording_session::SessionDeps;
pub mod ports;
