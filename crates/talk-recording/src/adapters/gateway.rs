//! Authentication and validation of commands sent by call backends.
//!
//! A command is accepted in two phases so the HTTP layer can refuse an
//! oversized body before reading it: [`RequestGateway::authorize`] checks the
//! headers and the declared length, [`RequestGateway::handle`] verifies the
//! checksum over the body and dispatches the command to the registry.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::common::verify_checksum;
use crate::domain::Actor;
use crate::domain::MediaMode;
use crate::domain::RecordingCommand;
use crate::domain::SessionKey;
use crate::domain::StartCommand;
use crate::domain::StopCommand;
use crate::usecases::ports::GatewaySettings;
use crate::usecases::ports::RecordingRegistry;
use crate::usecases::ports::RegistryError;

pub const BACKEND_HEADER: &str = "X-Recording-Backend";
pub const NONCE_HEADER: &str = "X-Recording-Random";
pub const CHECKSUM_HEADER: &str = "X-Recording-Checksum";

/// How a rejected command is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Authentication,
    Malformed,
    NotFound,
    Internal,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Missing {0} header")]
    MissingHeader(&'static str),
    #[error("No secret configured for backend {0}")]
    UnknownBackend(String),
    #[error("Checksum verification failed")]
    ChecksumMismatch,
    #[error("Missing message size")]
    MissingLength,
    #[error("Message size above limit: {size} > {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("Invalid token {0:?}")]
    InvalidToken(String),
    #[error("Malformed command: {0}")]
    Malformed(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl GatewayError {
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            GatewayError::MissingHeader(_)
            | GatewayError::UnknownBackend(_)
            | GatewayError::ChecksumMismatch => GatewayErrorKind::Authentication,
            GatewayError::MissingLength
            | GatewayError::TooLarge { .. }
            | GatewayError::InvalidToken(_)
            | GatewayError::Malformed(_) => GatewayErrorKind::Malformed,
            GatewayError::Registry(RegistryError::NotFound(_)) => GatewayErrorKind::NotFound,
            GatewayError::Registry(RegistryError::WorkerSpawn { .. }) => {
                GatewayErrorKind::Internal
            }
        }
    }
}

/// Authentication headers of an inbound command, as sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandHeaders<'a> {
    pub backend: Option<&'a str>,
    pub nonce: Option<&'a str>,
    pub checksum: Option<&'a str>,
    pub content_length: Option<u64>,
}

/// Headers of a command whose backend is known and whose body may be read
/// up to `body_limit` bytes.
#[derive(Debug, Clone)]
pub struct VerifiedRequest {
    backend: String,
    secret: String,
    nonce: String,
    checksum: String,
    body_limit: u64,
}

impl VerifiedRequest {
    pub fn body_limit(&self) -> u64 {
        self.body_limit
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum CommandEnvelope {
    Start { start: StartPayload },
    Stop { stop: StopPayload },
}

#[derive(Deserialize)]
struct StartPayload {
    #[serde(default)]
    status: MediaMode,
    owner: String,
    actor: Actor,
}

#[derive(Deserialize)]
struct StopPayload {
    #[serde(default)]
    actor: Option<PartialActor>,
}

#[derive(Deserialize)]
struct PartialActor {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<String>,
}

impl From<CommandEnvelope> for RecordingCommand {
    fn from(envelope: CommandEnvelope) -> Self {
        match envelope {
            CommandEnvelope::Start { start } => RecordingCommand::Start(StartCommand {
                media_mode: start.status,
                owner: start.owner,
                actor: start.actor,
            }),
            CommandEnvelope::Stop { stop } => RecordingCommand::Stop(StopCommand {
                // A stop actor is only reported when it is complete.
                actor: stop.actor.and_then(|a| match (a.kind, a.id) {
                    (Some(kind), Some(id)) => Some(Actor::new(kind, id)),
                    _ => None,
                }),
            }),
        }
    }
}

pub fn parse_command(body: &[u8]) -> Result<RecordingCommand, GatewayError> {
    serde_json::from_slice::<CommandEnvelope>(body)
        .map(RecordingCommand::from)
        .map_err(|e| GatewayError::Malformed(e.to_string()))
}

/// Tokens end up in file and audio sink names.
fn validate_token(token: &str) -> Result<(), GatewayError> {
    let valid = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidToken(token.to_string()))
    }
}

pub struct RequestGateway {
    settings: Arc<dyn GatewaySettings>,
    registry: Arc<dyn RecordingRegistry>,
}

impl RequestGateway {
    pub fn new(settings: Arc<dyn GatewaySettings>, registry: Arc<dyn RecordingRegistry>) -> Self {
        Self { settings, registry }
    }

    /// Checks everything that can be checked before the body is read.
    pub fn authorize(&self, headers: &CommandHeaders<'_>) -> Result<VerifiedRequest, GatewayError> {
        let backend = headers
            .backend
            .ok_or(GatewayError::MissingHeader(BACKEND_HEADER))?;
        let secret = self
            .settings
            .backend_secret(backend)
            .ok_or_else(|| GatewayError::UnknownBackend(backend.to_string()))?;
        let nonce = headers
            .nonce
            .ok_or(GatewayError::MissingHeader(NONCE_HEADER))?;
        let checksum = headers
            .checksum
            .ok_or(GatewayError::MissingHeader(CHECKSUM_HEADER))?;

        let limit = self.settings.max_message_size(backend);
        match headers.content_length {
            None | Some(0) => return Err(GatewayError::MissingLength),
            Some(size) if size > limit => return Err(GatewayError::TooLarge { size, limit }),
            Some(_) => {}
        }

        Ok(VerifiedRequest {
            backend: backend.to_string(),
            secret,
            nonce: nonce.to_string(),
            checksum: checksum.to_string(),
            body_limit: limit,
        })
    }

    /// Verifies the checksum of `body` and dispatches the command.
    ///
    /// Returns once the registry has accepted the command; the recording
    /// work itself runs in the background.
    pub fn handle(
        &self,
        request: &VerifiedRequest,
        token: &str,
        body: &[u8],
    ) -> Result<(), GatewayError> {
        let size = body.len() as u64;
        if size > request.body_limit {
            return Err(GatewayError::TooLarge {
                size,
                limit: request.body_limit,
            });
        }
        if !verify_checksum(
            request.secret.as_bytes(),
            request.nonce.as_bytes(),
            body,
            &request.checksum,
        ) {
            return Err(GatewayError::ChecksumMismatch);
        }
        validate_token(token)?;

        let key = SessionKey::new(request.backend.clone(), token);
        match parse_command(body)? {
            RecordingCommand::Start(command) => self.handle_start(key, command),
            RecordingCommand::Stop(command) => self.handle_stop(key, command),
        }
    }

    pub fn handle_start(&self, key: SessionKey, command: StartCommand) -> Result<(), GatewayError> {
        info!(backend = %key.backend(), token = %key.token(), "Start recording");
        self.registry.start_recording(key, command)?;
        Ok(())
    }

    pub fn handle_stop(&self, key: SessionKey, command: StopCommand) -> Result<(), GatewayError> {
        info!(backend = %key.backend(), token = %key.token(), "Stop recording");
        self.registry
            .stop_recording(key, command.actor)
            .inspect_err(|e| warn!(error = %e, "Stop rejected"))?;
        Ok(())
    }
}
