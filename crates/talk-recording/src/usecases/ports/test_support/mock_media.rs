//! Scripted media environment for use case tests.
//!
//! Every acquisition and release is appended to a shared event log so tests
//! can assert on ordering. Steps can be held open with a [`Gate`] or made to
//! fail.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::Gate;
use crate::domain::MediaMode;
use crate::domain::VideoSize;
use crate::usecases::ports::AudioSinkHandle;
use crate::usecases::ports::DisplayHandle;
use crate::usecases::ports::MediaEnvironment;
use crate::usecases::ports::MediaError;
use crate::usecases::ports::ParticipantHandle;
use crate::usecases::ports::ParticipantRequest;
use crate::usecases::ports::RecorderExit;
use crate::usecases::ports::RecorderHandle;
use crate::usecases::ports::RecorderRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStep {
    Display,
    AudioSink,
    Participant,
    JoinCall,
    Recorder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    DisplayAcquired,
    DisplayReleased,
    AudioSinkAcquired(String),
    AudioSinkReleased,
    ParticipantLaunched,
    CallJoined(String),
    ParticipantDisconnected,
    RecorderLaunched(PathBuf),
    RecorderTerminated,
}

type EventLog = Arc<Mutex<Vec<MediaEvent>>>;

#[derive(Default)]
pub struct MockMediaEnvironment {
    events: EventLog,
    failures: Vec<MediaStep>,
    release_failures: Vec<MediaStep>,
    gates: Vec<(MediaStep, Arc<Gate>)>,
    recorder_exit: Option<i32>,
    skip_output: bool,
    recorders_waiting: Arc<AtomicUsize>,
}

impl MockMediaEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, step: MediaStep) -> Self {
        self.failures.push(step);
        self
    }

    pub fn failing_release(mut self, step: MediaStep) -> Self {
        self.release_failures.push(step);
        self
    }

    pub fn gated_at(mut self, step: MediaStep, gate: Arc<Gate>) -> Self {
        self.gates.push((step, gate));
        self
    }

    /// Recorder exits on its own with `code` instead of waiting for terminate.
    pub fn with_recorder_exit(mut self, code: i32) -> Self {
        self.recorder_exit = Some(code);
        self
    }

    /// Recorder never writes its output file.
    pub fn without_output(mut self) -> Self {
        self.skip_output = true;
        self
    }

    pub fn events(&self) -> Vec<MediaEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn recorder_output(&self) -> Option<PathBuf> {
        self.events().into_iter().find_map(|e| match e {
            MediaEvent::RecorderLaunched(path) => Some(path),
            _ => None,
        })
    }

    /// Number of sessions blocked on their recorder.
    pub fn recorders_waiting(&self) -> usize {
        self.recorders_waiting.load(Ordering::SeqCst)
    }

    fn enter(&self, step: MediaStep) -> Result<(), MediaError> {
        for (gated, gate) in &self.gates {
            if *gated == step {
                gate.pass();
            }
        }
        if self.failures.contains(&step) {
            return Err(MediaError::command(
                format!("{step:?}"),
                "injected failure",
            ));
        }
        Ok(())
    }

    fn record(&self, event: MediaEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct MockDisplay {
    events: EventLog,
    release: Result<(), String>,
}

impl DisplayHandle for MockDisplay {
    fn display_name(&self) -> String {
        ":99".to_string()
    }

    fn release(&self) -> Result<(), MediaError> {
        self.events.lock().unwrap().push(MediaEvent::DisplayReleased);
        self.release
            .clone()
            .map_err(|reason| MediaError::command("release display", reason))
    }
}

struct MockAudioSink {
    name: String,
    events: EventLog,
    release: Result<(), String>,
}

impl AudioSinkHandle for MockAudioSink {
    fn sink_id(&self) -> String {
        self.name.clone()
    }

    fn release(&self) -> Result<(), MediaError> {
        self.events.lock().unwrap().push(MediaEvent::AudioSinkReleased);
        self.release
            .clone()
            .map_err(|reason| MediaError::command("release audio sink", reason))
    }
}

struct MockParticipant {
    events: EventLog,
    join: Result<(), String>,
    join_gate: Option<Arc<Gate>>,
    disconnect: Result<(), String>,
}

impl ParticipantHandle for MockParticipant {
    fn join_call(&self, token: &str) -> Result<(), MediaError> {
        if let Some(gate) = &self.join_gate {
            gate.pass();
        }
        self.join
            .clone()
            .map_err(|reason| MediaError::command("join call", reason))?;
        self.events
            .lock()
            .unwrap()
            .push(MediaEvent::CallJoined(token.to_string()));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), MediaError> {
        self.events
            .lock()
            .unwrap()
            .push(MediaEvent::ParticipantDisconnected);
        self.disconnect
            .clone()
            .map_err(|reason| MediaError::command("disconnect", reason))
    }
}

struct MockRecorder {
    events: EventLog,
    waiting: Arc<AtomicUsize>,
    exit: Mutex<Option<i32>>,
    cv: Condvar,
}

impl RecorderHandle for MockRecorder {
    fn wait(&self) -> Result<RecorderExit, MediaError> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let (exit, _) = self
            .cv
            .wait_timeout_while(self.exit.lock().unwrap(), Duration::from_secs(10), |e| {
                e.is_none()
            })
            .unwrap();
        match *exit {
            Some(code) => Ok(RecorderExit { code: Some(code) }),
            None => Err(MediaError::command("wait", "recorder never exited")),
        }
    }

    fn terminate(&self) -> Result<(), MediaError> {
        self.events
            .lock()
            .unwrap()
            .push(MediaEvent::RecorderTerminated);
        let mut exit = self.exit.lock().unwrap();
        if exit.is_none() {
            *exit = Some(RecorderExit::TERMINATED_INTENTIONALLY);
        }
        self.cv.notify_all();
        Ok(())
    }
}

fn outcome(fail: bool) -> Result<(), String> {
    if fail {
        Err("injected failure".to_string())
    } else {
        Ok(())
    }
}

impl MediaEnvironment for MockMediaEnvironment {
    fn acquire_display(&self, _size: VideoSize) -> Result<Arc<dyn DisplayHandle>, MediaError> {
        self.enter(MediaStep::Display)?;
        self.record(MediaEvent::DisplayAcquired);
        Ok(Arc::new(MockDisplay {
            events: Arc::clone(&self.events),
            release: outcome(self.release_failures.contains(&MediaStep::Display)),
        }))
    }

    fn acquire_audio_sink(&self, base_name: &str) -> Result<Arc<dyn AudioSinkHandle>, MediaError> {
        self.enter(MediaStep::AudioSink)?;
        self.record(MediaEvent::AudioSinkAcquired(base_name.to_string()));
        Ok(Arc::new(MockAudioSink {
            name: base_name.to_string(),
            events: Arc::clone(&self.events),
            release: outcome(self.release_failures.contains(&MediaStep::AudioSink)),
        }))
    }

    fn launch_participant(
        &self,
        _request: &ParticipantRequest<'_>,
    ) -> Result<Arc<dyn ParticipantHandle>, MediaError> {
        self.enter(MediaStep::Participant)?;
        self.record(MediaEvent::ParticipantLaunched);
        let join_gate = self
            .gates
            .iter()
            .find(|(step, _)| *step == MediaStep::JoinCall)
            .map(|(_, gate)| Arc::clone(gate));
        Ok(Arc::new(MockParticipant {
            events: Arc::clone(&self.events),
            join: outcome(self.failures.contains(&MediaStep::JoinCall)),
            join_gate,
            disconnect: outcome(self.release_failures.contains(&MediaStep::Participant)),
        }))
    }

    fn recording_extension(&self, mode: MediaMode) -> String {
        if mode.has_video() {
            ".webm".to_string()
        } else {
            ".ogg".to_string()
        }
    }

    fn launch_recorder(
        &self,
        request: &RecorderRequest<'_>,
    ) -> Result<Arc<dyn RecorderHandle>, MediaError> {
        self.enter(MediaStep::Recorder)?;
        if !self.skip_output {
            std::fs::write(request.output, b"recorded media").map_err(|source| {
                MediaError::Io {
                    operation: "write mock recording",
                    source,
                }
            })?;
        }
        self.record(MediaEvent::RecorderLaunched(request.output.to_path_buf()));
        Ok(Arc::new(MockRecorder {
            events: Arc::clone(&self.events),
            waiting: Arc::clone(&self.recorders_waiting),
            exit: Mutex::new(self.recorder_exit),
            cv: Condvar::new(),
        }))
    }
}
