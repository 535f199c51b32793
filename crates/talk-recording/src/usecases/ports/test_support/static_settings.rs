use std::path::Path;

use crate::domain::SessionSettings;
use crate::domain::VideoSize;
use crate::usecases::ports::BackendSettings;

/// Same settings for every backend, rooted in a test directory.
pub struct StaticSettings {
    settings: SessionSettings,
}

impl StaticSettings {
    pub fn new(directory: &Path) -> Self {
        Self {
            settings: SessionSettings {
                video_size: VideoSize {
                    width: 640,
                    height: 480,
                },
                directory: directory.to_path_buf(),
            },
        }
    }
}

impl BackendSettings for StaticSettings {
    fn session_settings(&self, _backend: &str) -> SessionSettings {
        self.settings.clone()
    }
}
