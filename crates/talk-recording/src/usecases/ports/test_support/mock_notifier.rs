//! Recording notifier for use case tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use super::Gate;

use crate::domain::Actor;
use crate::domain::MediaMode;
use crate::domain::SessionKey;
use crate::usecases::ports::BackendNotifier;
use crate::usecases::ports::NotifyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    Started {
        token: String,
        mode: MediaMode,
        actor: Actor,
    },
    Stopped {
        token: String,
        actor: Option<Actor>,
    },
    Failed {
        token: String,
    },
    Uploaded {
        token: String,
        file_name: String,
        owner: String,
        contents: Vec<u8>,
    },
}

#[derive(Default)]
pub struct MockNotifier {
    events: Mutex<Vec<NotifyEvent>>,
    fail_started: bool,
    fail_upload: bool,
    stopped_gate: Option<Arc<Gate>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_started(mut self) -> Self {
        self.fail_started = true;
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    /// Holds `stopped` notifications until `gate` opens.
    pub fn gated_stopped(mut self, gate: Arc<Gate>) -> Self {
        self.stopped_gate = Some(gate);
        self
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn started_count(&self) -> usize {
        self.count(|e| matches!(e, NotifyEvent::Started { .. }))
    }

    pub fn stopped_count(&self) -> usize {
        self.count(|e| matches!(e, NotifyEvent::Stopped { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|e| matches!(e, NotifyEvent::Failed { .. }))
    }

    pub fn uploaded_count(&self) -> usize {
        self.count(|e| matches!(e, NotifyEvent::Uploaded { .. }))
    }

    fn count(&self, predicate: impl Fn(&NotifyEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }

    fn exhausted(what: &str) -> NotifyError {
        NotifyError::Exhausted {
            url: format!("mock://{what}"),
            attempts: 3,
            reason: "injected failure".to_string(),
        }
    }
}

impl BackendNotifier for MockNotifier {
    fn started(&self, key: &SessionKey, mode: MediaMode, actor: &Actor) -> Result<(), NotifyError> {
        if self.fail_started {
            return Err(Self::exhausted("started"));
        }
        self.events.lock().unwrap().push(NotifyEvent::Started {
            token: key.token().to_string(),
            mode,
            actor: actor.clone(),
        });
        Ok(())
    }

    fn stopped(&self, key: &SessionKey, actor: Option<&Actor>) -> Result<(), NotifyError> {
        if let Some(gate) = &self.stopped_gate {
            gate.pass();
        }
        self.events.lock().unwrap().push(NotifyEvent::Stopped {
            token: key.token().to_string(),
            actor: actor.cloned(),
        });
        Ok(())
    }

    fn failed(&self, key: &SessionKey) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(NotifyEvent::Failed {
            token: key.token().to_string(),
        });
        Ok(())
    }

    fn upload_recording(
        &self,
        key: &SessionKey,
        file: &Path,
        owner: &str,
    ) -> Result<(), NotifyError> {
        if self.fail_upload {
            return Err(Self::exhausted("upload"));
        }
        let contents = std::fs::read(file).map_err(|source| NotifyError::ReadFile {
            path: file.to_path_buf(),
            source,
        })?;
        self.events.lock().unwrap().push(NotifyEvent::Uploaded {
            token: key.token().to_string(),
            file_name: file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            owner: owner.to_string(),
            contents,
        });
        Ok(())
    }
}
