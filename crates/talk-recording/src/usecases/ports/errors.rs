use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::RecorderExit;
use crate::domain::SessionKey;

/// Failures of the external collaborators a session drives.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{resource} did not become ready: {reason}")]
    NotReady {
        resource: &'static str,
        reason: String,
    },
    #[error("{operation} failed: {reason}")]
    Command { operation: String, reason: String },
}

impl MediaError {
    pub fn command(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        MediaError::Command {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Failures talking to the call backend.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("No secret configured for backend {0}")]
    MissingSecret(String),
    #[error("Failed to sign message: {0}")]
    Signing(String),
    #[error("Invalid backend URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Failed to read recording {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("Request to {url} failed after {attempts} attempts: {reason}")]
    Exhausted {
        url: String,
        attempts: u32,
        reason: String,
    },
}

/// Why a recording session ended other than through a requested stop.
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Failed to create recording directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Recording was stopped after acquiring the {0}")]
    StoppedDuringStart(&'static str),
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
    #[error("Backend notification failed: {0}")]
    Notify(#[from] NotifyError),
    #[error("Recorder ended unexpectedly with {0}")]
    RecorderExited(RecorderExit),
    #[error("Failed to remove uploaded recording {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Recording not found: {0}")]
    NotFound(SessionKey),
    #[error("Failed to spawn worker for {key}: {reason}")]
    WorkerSpawn { key: SessionKey, reason: String },
}
