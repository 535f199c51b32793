use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Identifies the recording of one call on one backend.
///
/// A call can only be recorded once at a time, so the pair is the primary
/// key of the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    backend: String,
    token: String,
}

impl SessionKey {
    pub fn new(backend: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            token: token.into(),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Backend URL reduced to its alphanumeric characters, safe for paths and
    /// audio sink names.
    pub fn sanitized_backend(&self) -> String {
        self.backend
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.backend, self.token)
    }
}

/// What a recording captures. Sent over the wire as the backend's numeric
/// recording status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MediaMode {
    #[default]
    AudioAndVideo,
    AudioOnly,
}

impl MediaMode {
    pub const AUDIO_AND_VIDEO_STATUS: u8 = 1;
    pub const AUDIO_ONLY_STATUS: u8 = 2;

    pub fn has_video(self) -> bool {
        matches!(self, MediaMode::AudioAndVideo)
    }
}

impl TryFrom<u8> for MediaMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            Self::AUDIO_AND_VIDEO_STATUS => Ok(MediaMode::AudioAndVideo),
            Self::AUDIO_ONLY_STATUS => Ok(MediaMode::AudioOnly),
            other => Err(format!("unknown recording status {other}")),
        }
    }
}

impl From<MediaMode> for u8 {
    fn from(mode: MediaMode) -> Self {
        match mode {
            MediaMode::AudioAndVideo => MediaMode::AUDIO_AND_VIDEO_STATUS,
            MediaMode::AudioOnly => MediaMode::AUDIO_ONLY_STATUS,
        }
    }
}

/// The participant that triggered a start or stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl Actor {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-backend settings resolved when a session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub video_size: VideoSize,
    pub directory: PathBuf,
}

impl SessionSettings {
    /// `<directory>/<sanitized backend>/<token>`
    pub fn session_directory(&self, key: &SessionKey) -> PathBuf {
        self.directory
            .join(key.sanitized_backend())
            .join(key.token())
    }
}
