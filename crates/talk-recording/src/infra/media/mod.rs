//! Media resources provided by the host system: Xvfb displays, PulseAudio
//! sinks, the participant client and ffmpeg.

mod audio_sink;
mod display;
mod participant;
mod process;
mod recorder;

use std::sync::Arc;

use crate::domain::MediaMode;
use crate::domain::VideoSize;
use crate::infra::daemon::ServerConfig;
use crate::usecases::ports::AudioSinkHandle;
use crate::usecases::ports::DisplayHandle;
use crate::usecases::ports::MediaEnvironment;
use crate::usecases::ports::MediaError;
use crate::usecases::ports::ParticipantHandle;
use crate::usecases::ports::ParticipantRequest;
use crate::usecases::ports::RecorderHandle;
use crate::usecases::ports::RecorderRequest;

use audio_sink::PulseAudioSink;
use display::XvfbDisplay;
use participant::ParticipantClient;
use participant::ParticipantLaunch;
use recorder::FfmpegRecorder;

pub struct SystemMediaEnvironment {
    config: Arc<ServerConfig>,
}

impl SystemMediaEnvironment {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }
}

impl MediaEnvironment for SystemMediaEnvironment {
    fn acquire_display(&self, size: VideoSize) -> Result<Arc<dyn DisplayHandle>, MediaError> {
        Ok(Arc::new(XvfbDisplay::start(size)?))
    }

    fn acquire_audio_sink(&self, base_name: &str) -> Result<Arc<dyn AudioSinkHandle>, MediaError> {
        Ok(Arc::new(PulseAudioSink::create(base_name)?))
    }

    fn launch_participant(
        &self,
        request: &ParticipantRequest<'_>,
    ) -> Result<Arc<dyn ParticipantHandle>, MediaError> {
        let client = ParticipantClient::new(ParticipantLaunch {
            command: self.config.participant_command().to_vec(),
            backend: request.backend.to_string(),
            display: request.display.to_string(),
            audio_sink: request.audio_sink.to_string(),
            video_size: request.video_size,
            signaling_secret: self.config.signaling_secret().map(str::to_string),
        })?;
        Ok(Arc::new(client))
    }

    fn recording_extension(&self, mode: MediaMode) -> String {
        recorder::recording_extension(self.config.recorder(), mode)
    }

    fn launch_recorder(
        &self,
        request: &RecorderRequest<'_>,
    ) -> Result<Arc<dyn RecorderHandle>, MediaError> {
        Ok(Arc::new(FfmpegRecorder::start(
            self.config.recorder(),
            request,
        )?))
    }
}
