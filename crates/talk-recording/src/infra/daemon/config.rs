//! Server configuration.
//!
//! Loaded once at startup from a TOML file. Every per-backend value falls
//! back to the `[backend]` section and then to a built-in default.

use std::collections::HashMap;
use std::env;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::SessionSettings;
use crate::domain::VideoSize;
use crate::usecases::ports::BackendSettings;
use crate::usecases::ports::GatewaySettings;

pub const LISTEN_ENV: &str = "TALK_RECORDING_LISTEN";
pub const MAX_MESSAGE_SIZE_ENV: &str = "TALK_RECORDING_MAX_MESSAGE_SIZE";

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
const DEFAULT_MAX_MESSAGE_SIZE: u64 = 1024;
const DEFAULT_VIDEO_WIDTH: u32 = 1920;
const DEFAULT_VIDEO_HEIGHT: u32 = 1080;
const DEFAULT_DIRECTORY: &str = "/tmp";

const DEFAULT_FFMPEG_COMMON: &str = "ffmpeg -loglevel level+warning -n";
const DEFAULT_FFMPEG_OUTPUT_AUDIO: &str = "-c:a libopus";
const DEFAULT_FFMPEG_OUTPUT_VIDEO: &str = "-c:v libvpx -deadline:v realtime -crf 10 -b:v 1M";
const DEFAULT_EXTENSION_AUDIO: &str = ".ogg";
const DEFAULT_EXTENSION_VIDEO: &str = ".webm";
const DEFAULT_PARTICIPANT_COMMAND: &str = "firefox --new-instance --kiosk";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml_edit::de::Error,
    },
    #[error("Invalid command line in {key}: {reason}")]
    CommandLine { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BackendValues {
    skipverify: Option<bool>,
    maxmessagesize: Option<u64>,
    videowidth: Option<u32>,
    videoheight: Option<u32>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    logs: LogsSection,
    http: HttpSection,
    backend: BackendDefaults,
    backends: HashMap<String, BackendSection>,
    signaling: SignalingSection,
    ffmpeg: FfmpegSection,
    participant: ParticipantSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogsSection {
    level: Option<LogLevel>,
}

/// Either a level name or one of the numeric levels older files use.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LogLevel {
    Numeric(u32),
    Named(String),
}

impl LogLevel {
    fn into_string(self) -> String {
        match self {
            LogLevel::Numeric(level) => level.to_string(),
            LogLevel::Named(level) => level,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HttpSection {
    listen: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BackendDefaults {
    allowall: bool,
    secret: Option<String>,
    backends: Vec<String>,
    #[serde(flatten)]
    values: BackendValues,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BackendSection {
    url: Option<String>,
    secret: Option<String>,
    #[serde(flatten)]
    values: BackendValues,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SignalingSection {
    internalsecret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FfmpegSection {
    common: Option<String>,
    outputaudio: Option<String>,
    outputvideo: Option<String>,
    extensionaudio: Option<String>,
    extensionvideo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParticipantSection {
    command: Option<String>,
}

#[derive(Debug, Clone)]
struct ConfiguredBackend {
    id: String,
    secret: String,
    values: BackendValues,
}

/// Argument templates of the recorder process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderTemplates {
    pub common: Vec<String>,
    pub output_audio: Vec<String>,
    pub output_video: Vec<String>,
    pub extension_audio: String,
    pub extension_video: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    log_level: String,
    listen: String,
    allow_all: bool,
    shared_secret: Option<String>,
    defaults: BackendValues,
    backends: HashMap<String, ConfiguredBackend>,
    signaling_secret: Option<String>,
    recorder: RecorderTemplates,
    participant_command: Vec<String>,
}

fn split_command(
    key: &'static str,
    value: Option<String>,
    default: &str,
) -> Result<Vec<String>, ConfigError> {
    let value = value.unwrap_or_else(|| default.to_string());
    shell_words::split(&value).map_err(|e| ConfigError::CommandLine {
        key,
        reason: e.to_string(),
    })
}

fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

impl ServerConfig {
    /// Loads `path`. A missing file is not an error: every value then takes
    /// its default.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => {
                info!(path = %path.display(), "Loading configuration");
                contents
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Configuration file not found");
                String::new()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&contents, path)
    }

    #[cfg(test)]
    pub(crate) fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Path::new("<inline>"))
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: FileConfig =
            toml_edit::de::from_str(contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_file_config(file)
    }

    fn from_file_config(file: FileConfig) -> Result<Self, ConfigError> {
        let mut backends = HashMap::new();
        if file.backend.backends.is_empty() && !file.backend.allowall {
            warn!("No configured backends");
        }
        for id in &file.backend.backends {
            let id = id.trim();
            let Some(section) = file.backends.get(id) else {
                error!(backend = id, "Missing section for backend");
                continue;
            };
            let Some(url) = section.url.as_deref() else {
                error!(backend = id, "Missing 'url' property for backend");
                continue;
            };
            let Some(secret) = section.secret.clone() else {
                error!(backend = id, "Missing 'secret' property for backend");
                continue;
            };
            backends.insert(
                normalize_url(url).to_string(),
                ConfiguredBackend {
                    id: id.to_string(),
                    secret,
                    values: section.values.clone(),
                },
            );
        }

        let mut defaults = file.backend.values;
        if let Some(size) = parse_env_u64(MAX_MESSAGE_SIZE_ENV) {
            defaults.maxmessagesize = Some(size);
        }

        let ffmpeg = file.ffmpeg;
        let recorder = RecorderTemplates {
            common: split_command("ffmpeg.common", ffmpeg.common, DEFAULT_FFMPEG_COMMON)?,
            output_audio: split_command(
                "ffmpeg.outputaudio",
                ffmpeg.outputaudio,
                DEFAULT_FFMPEG_OUTPUT_AUDIO,
            )?,
            output_video: split_command(
                "ffmpeg.outputvideo",
                ffmpeg.outputvideo,
                DEFAULT_FFMPEG_OUTPUT_VIDEO,
            )?,
            extension_audio: ffmpeg
                .extensionaudio
                .unwrap_or_else(|| DEFAULT_EXTENSION_AUDIO.to_string()),
            extension_video: ffmpeg
                .extensionvideo
                .unwrap_or_else(|| DEFAULT_EXTENSION_VIDEO.to_string()),
        };
        if recorder.common.is_empty() {
            return Err(ConfigError::CommandLine {
                key: "ffmpeg.common",
                reason: "no program given".to_string(),
            });
        }
        let participant_command = split_command(
            "participant.command",
            file.participant.command,
            DEFAULT_PARTICIPANT_COMMAND,
        )?;
        if participant_command.is_empty() {
            return Err(ConfigError::CommandLine {
                key: "participant.command",
                reason: "no program given".to_string(),
            });
        }

        Ok(Self {
            log_level: file
                .logs
                .level
                .map_or_else(|| DEFAULT_LOG_LEVEL.to_string(), LogLevel::into_string),
            listen: file.http.listen.unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            allow_all: file.backend.allowall,
            shared_secret: file.backend.secret,
            defaults,
            backends,
            signaling_secret: file.signaling.internalsecret,
            recorder,
            participant_command,
        })
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Address of the HTTP API. `TALK_RECORDING_LISTEN` wins over the file.
    pub fn listen(&self) -> String {
        match env::var(LISTEN_ENV) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => self.listen.clone(),
        }
    }

    pub fn backend_secret(&self, backend_url: &str) -> Option<String> {
        if self.allow_all {
            return self.shared_secret.clone();
        }
        self.backends
            .get(normalize_url(backend_url))
            .map(|backend| backend.secret.clone())
    }

    /// Id of the `[backends.<id>]` section configuring `backend_url`.
    pub fn backend_id(&self, backend_url: &str) -> Option<&str> {
        self.backends
            .get(normalize_url(backend_url))
            .map(|backend| backend.id.as_str())
    }

    pub fn skip_verify(&self, backend_url: &str) -> bool {
        self.backend_value(backend_url, |v| v.skipverify)
            .unwrap_or(false)
    }

    pub fn max_message_size(&self, backend_url: &str) -> u64 {
        self.backend_value(backend_url, |v| v.maxmessagesize)
            .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn video_size(&self, backend_url: &str) -> VideoSize {
        VideoSize {
            width: self
                .backend_value(backend_url, |v| v.videowidth)
                .unwrap_or(DEFAULT_VIDEO_WIDTH),
            height: self
                .backend_value(backend_url, |v| v.videoheight)
                .unwrap_or(DEFAULT_VIDEO_HEIGHT),
        }
    }

    pub fn directory(&self, backend_url: &str) -> PathBuf {
        self.backend_value(backend_url, |v| v.directory.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIRECTORY))
    }

    pub fn signaling_secret(&self) -> Option<&str> {
        self.signaling_secret.as_deref()
    }

    pub fn recorder(&self) -> &RecorderTemplates {
        &self.recorder
    }

    pub fn participant_command(&self) -> &[String] {
        &self.participant_command
    }

    fn backend_value<T>(
        &self,
        backend_url: &str,
        get: impl Fn(&BackendValues) -> Option<T>,
    ) -> Option<T> {
        self.backends
            .get(normalize_url(backend_url))
            .and_then(|backend| get(&backend.values))
            .or_else(|| get(&self.defaults))
    }
}

impl BackendSettings for ServerConfig {
    fn session_settings(&self, backend: &str) -> SessionSettings {
        SessionSettings {
            video_size: self.video_size(backend),
            directory: self.directory(backend),
        }
    }
}

impl GatewaySettings for ServerConfig {
    fn backend_secret(&self, backend: &str) -> Option<String> {
        ServerConfig::backend_secret(self, backend)
    }

    fn max_message_size(&self, backend: &str) -> u64 {
        ServerConfig::max_message_size(self, backend)
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    let value = env::var(key).ok()?;
    if value.trim().is_empty() {
        return None;
    }
    match value.trim().parse::<u64>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(value = %value, key, "Invalid numeric config; using default");
            None
        }
    }
}
