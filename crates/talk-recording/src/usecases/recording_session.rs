//! State machine of a single recording.
//!
//! `start` runs on its own worker and blocks for the whole recording. `stop`
//! and `abort` may run concurrently from another thread: they only latch the
//! stop flag and release whatever has been acquired so far. `start` checks
//! the latch after every acquisition, so a resource acquired after a
//! concurrent teardown is released by `start` itself.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::common::mutex_lock_or_recover;
use crate::domain::Actor;
use crate::domain::MediaMode;
use crate::domain::SessionKey;
use crate::domain::SessionSettings;
use crate::usecases::ports::AudioSinkHandle;
use crate::usecases::ports::BackendNotifier;
use crate::usecases::ports::DisplayHandle;
use crate::usecases::ports::MediaEnvironment;
use crate::usecases::ports::ParticipantHandle;
use crate::usecases::ports::ParticipantRequest;
use crate::usecases::ports::RecorderHandle;
use crate::usecases::ports::RecorderRequest;
use crate::usecases::ports::RecordingError;

/// Set-once flag readable from any thread without locking.
#[derive(Default)]
struct Latch(AtomicBool);

impl Latch {
    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct AcquiredResources {
    display: Option<Arc<dyn DisplayHandle>>,
    audio_sink: Option<Arc<dyn AudioSinkHandle>>,
    participant: Option<Arc<dyn ParticipantHandle>>,
    recorder: Option<Arc<dyn RecorderHandle>>,
}

/// Collaborators shared by every session of the server.
#[derive(Clone)]
pub struct SessionDeps {
    pub notifier: Arc<dyn BackendNotifier>,
    pub media: Arc<dyn MediaEnvironment>,
}

pub struct RecordingSession {
    key: SessionKey,
    media_mode: MediaMode,
    owner: String,
    settings: SessionSettings,
    deps: SessionDeps,
    started: Latch,
    stopped: Latch,
    aborted: Latch,
    resources: Mutex<AcquiredResources>,
    output_file: Mutex<Option<PathBuf>>,
}

impl RecordingSession {
    pub fn new(
        key: SessionKey,
        media_mode: MediaMode,
        owner: impl Into<String>,
        settings: SessionSettings,
        deps: SessionDeps,
    ) -> Self {
        Self {
            key,
            media_mode,
            owner: owner.into(),
            settings,
            deps,
            started: Latch::default(),
            stopped: Latch::default(),
            aborted: Latch::default(),
            resources: Mutex::new(AcquiredResources::default()),
            output_file: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn is_started(&self) -> bool {
        self.started.is_set()
    }

    /// Acquires every resource, notifies the backend and blocks until the
    /// recorder exits.
    ///
    /// Any failure tears the session down and, unless the failure was caused
    /// by a stop that arrived before the recording started, notifies the
    /// backend that the recording failed.
    pub fn start(&self, actor: &Actor) -> Result<(), RecordingError> {
        let result = self.run(actor);
        if let Err(ref err) = result {
            self.teardown();

            if self.stopped.is_set() && !self.started.is_set() {
                info!(
                    backend = %self.key.backend(),
                    token = %self.key.token(),
                    reason = %err,
                    "Recording stopped before it started"
                );
            } else if self.aborted.is_set() {
                debug!(
                    token = %self.key.token(),
                    reason = %err,
                    "Recording aborted during shutdown"
                );
            } else {
                error!(
                    backend = %self.key.backend(),
                    token = %self.key.token(),
                    error = %err,
                    "Recording failed"
                );
                if let Err(notify_err) = self.deps.notifier.failed(&self.key) {
                    warn!(
                        token = %self.key.token(),
                        error = %notify_err,
                        "Failed to notify backend about failed recording"
                    );
                }
            }
        }
        result
    }

    fn run(&self, actor: &Actor) -> Result<(), RecordingError> {
        self.ensure_not_stopped("working directory")?;

        let directory = self.settings.session_directory(&self.key);
        std::fs::create_dir_all(&directory).map_err(|source| RecordingError::Directory {
            path: directory.clone(),
            source,
        })?;
        self.ensure_not_stopped("working directory")?;

        let video_size = self.settings.video_size;
        let display = self.deps.media.acquire_display(video_size)?;
        let display_name = display.display_name();
        self.store(|r| r.display = Some(display));
        self.ensure_not_stopped("display")?;

        let sink_name = format!("{}-{}", self.key.sanitized_backend(), self.key.token());
        let audio_sink = self.deps.media.acquire_audio_sink(&sink_name)?;
        let sink_id = audio_sink.sink_id();
        self.store(|r| r.audio_sink = Some(audio_sink));
        self.ensure_not_stopped("audio sink")?;

        let participant = self.deps.media.launch_participant(&ParticipantRequest {
            backend: self.key.backend(),
            display: &display_name,
            audio_sink: &sink_id,
            video_size,
        })?;
        self.store(|r| r.participant = Some(Arc::clone(&participant)));
        self.ensure_not_stopped("participant")?;

        participant.join_call(self.key.token())?;
        self.ensure_not_stopped("call")?;

        self.started.set();
        self.deps
            .notifier
            .started(&self.key, self.media_mode, actor)?;
        info!(
            backend = %self.key.backend(),
            token = %self.key.token(),
            media_mode = ?self.media_mode,
            "Recording started"
        );

        let output = output_file_path(
            &directory,
            &self.deps.media.recording_extension(self.media_mode),
        );
        *mutex_lock_or_recover(&self.output_file) = Some(output.clone());

        let recorder = self.deps.media.launch_recorder(&RecorderRequest {
            media_mode: self.media_mode,
            display: &display_name,
            audio_sink: &sink_id,
            video_size,
            output: &output,
        })?;
        self.store(|r| r.recorder = Some(Arc::clone(&recorder)));
        self.ensure_not_stopped("recorder")?;

        let exit = recorder.wait()?;
        if exit.is_intentional_termination() && self.stopped.is_set() {
            debug!(token = %self.key.token(), "Recorder terminated");
            return Ok(());
        }
        Err(RecordingError::RecorderExited(exit))
    }

    /// Stops the recording, notifies the backend and uploads the recording.
    ///
    /// The local file is only removed after a successful upload.
    pub fn stop(&self, actor: Option<&Actor>) -> Result<(), RecordingError> {
        self.stopped.set();
        self.teardown();

        self.deps.notifier.stopped(&self.key, actor)?;
        info!(
            backend = %self.key.backend(),
            token = %self.key.token(),
            "Recording stopped"
        );

        let Some(output) = mutex_lock_or_recover(&self.output_file).clone() else {
            error!(token = %self.key.token(), "Recording stopped without an output file");
            return Ok(());
        };
        if !output.exists() {
            error!(
                token = %self.key.token(),
                path = %output.display(),
                "Recording output file does not exist"
            );
            return Ok(());
        }

        self.deps
            .notifier
            .upload_recording(&self.key, &output, &self.owner)?;
        std::fs::remove_file(&output).map_err(|source| RecordingError::Cleanup {
            path: output.clone(),
            source,
        })?;
        info!(
            token = %self.key.token(),
            path = %output.display(),
            "Recording uploaded"
        );
        Ok(())
    }

    /// Releases every resource without telling the backend.
    pub fn abort(&self) {
        self.aborted.set();
        self.stopped.set();
        self.teardown();
    }

    fn ensure_not_stopped(&self, acquired: &'static str) -> Result<(), RecordingError> {
        if self.stopped.is_set() {
            return Err(RecordingError::StoppedDuringStart(acquired));
        }
        Ok(())
    }

    fn store(&self, update: impl FnOnce(&mut AcquiredResources)) {
        update(&mut mutex_lock_or_recover(&self.resources));
    }

    /// Releases acquired resources in reverse acquisition order. Every step
    /// runs even if an earlier one fails.
    fn teardown(&self) {
        let acquired = std::mem::take(&mut *mutex_lock_or_recover(&self.resources));
        let token = self.key.token();

        if let Some(recorder) = acquired.recorder {
            if let Err(e) = recorder.terminate() {
                warn!(token = %token, error = %e, "Failed to terminate recorder");
            }
        }
        if let Some(participant) = acquired.participant {
            if let Err(e) = participant.disconnect() {
                warn!(token = %token, error = %e, "Failed to disconnect participant");
            }
        }
        if let Some(audio_sink) = acquired.audio_sink {
            if let Err(e) = audio_sink.release() {
                warn!(token = %token, error = %e, "Failed to release audio sink");
            }
        }
        if let Some(display) = acquired.display {
            if let Err(e) = display.release() {
                warn!(token = %token, error = %e, "Failed to release display");
            }
        }
    }
}

fn output_file_path(directory: &Path, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    directory.join(format!("recording-{stamp}{extension}"))
}
