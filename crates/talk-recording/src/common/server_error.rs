use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to setup signal handler: {0}")]
    SignalSetup(String),
    #[error("Failed to setup backend notifier: {0}")]
    NotifierSetup(String),
    #[error("Failed to start HTTP API: {0}")]
    ApiStart(String),
}
