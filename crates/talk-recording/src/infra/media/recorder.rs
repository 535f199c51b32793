//! ffmpeg recorder capturing the session display and audio sink.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use super::process::ManagedProcess;
use crate::domain::MediaMode;
use crate::infra::daemon::RecorderTemplates;
use crate::usecases::ports::MediaError;
use crate::usecases::ports::RecorderExit;
use crate::usecases::ports::RecorderHandle;
use crate::usecases::ports::RecorderRequest;

/// ffmpeg needs time to finalize the container after SIGTERM.
const STOP_GRACE: Duration = Duration::from_secs(30);

pub fn recorder_args(templates: &RecorderTemplates, request: &RecorderRequest<'_>) -> Vec<String> {
    let mut args = templates.common.clone();
    args.extend([
        "-f".to_string(),
        "pulse".to_string(),
        "-i".to_string(),
        request.audio_sink.to_string(),
    ]);
    if request.media_mode.has_video() {
        args.extend([
            "-f".to_string(),
            "x11grab".to_string(),
            "-draw_mouse".to_string(),
            "0".to_string(),
            "-video_size".to_string(),
            request.video_size.to_string(),
            "-i".to_string(),
            request.display.to_string(),
        ]);
    }
    args.extend(templates.output_audio.iter().cloned());
    if request.media_mode.has_video() {
        args.extend(templates.output_video.iter().cloned());
    }
    args.push(request.output.to_string_lossy().into_owned());
    args
}

pub fn recording_extension(templates: &RecorderTemplates, mode: MediaMode) -> String {
    if mode.has_video() {
        templates.extension_video.clone()
    } else {
        templates.extension_audio.clone()
    }
}

pub struct FfmpegRecorder {
    process: ManagedProcess,
}

impl FfmpegRecorder {
    pub fn start(
        templates: &RecorderTemplates,
        request: &RecorderRequest<'_>,
    ) -> Result<Self, MediaError> {
        let args = recorder_args(templates, request);
        let Some((program, rest)) = args.split_first() else {
            return Err(MediaError::command("launch recorder", "empty command"));
        };
        let mut command = Command::new(program);
        command.args(rest);
        let name = recorder_name(request.output);
        debug!(recorder = %name, args = ?args, "Starting recorder");
        Ok(Self {
            process: ManagedProcess::spawn(name, command)?,
        })
    }
}

fn recorder_name(output: &Path) -> String {
    output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recorder".to_string())
}

impl RecorderHandle for FfmpegRecorder {
    fn wait(&self) -> Result<RecorderExit, MediaError> {
        let status = self.process.wait()?;
        Ok(RecorderExit {
            code: status.code(),
        })
    }

    fn terminate(&self) -> Result<(), MediaError> {
        self.process.terminate(STOP_GRACE)
    }
}
