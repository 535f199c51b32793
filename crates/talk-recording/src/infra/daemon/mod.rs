#![deny(clippy::all)]
mod config;
mod registry;
mod signal_handler;

pub use config::ConfigError;
pub use config::RecorderTemplates;
pub use config::ServerConfig;
pub use registry::SessionRegistry;
pub use signal_handler::SignalHandler;
