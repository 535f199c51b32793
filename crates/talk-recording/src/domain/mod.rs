pub mod commands;
pub mod session_types;

pub use commands::RecordingCommand;
pub use commands::StartCommand;
pub use commands::StopCommand;
pub use session_types::Actor;
pub use session_types::MediaMode;
pub use session_types::SessionKey;
pub use session_types::SessionSettings;
pub use session_types::VideoSize;
