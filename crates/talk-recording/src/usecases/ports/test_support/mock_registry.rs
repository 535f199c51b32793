//! Registry double that records the commands it receives.

use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::domain::Actor;
use crate::domain::SessionKey;
use crate::domain::StartCommand;
use crate::usecases::ports::RecordingRegistry;
use crate::usecases::ports::RegistryError;
use crate::usecases::ports::StartOutcome;
use crate::usecases::ports::StopOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Start(SessionKey, StartCommand),
    Stop(SessionKey, Option<Actor>),
    AbortAll,
}

#[derive(Default)]
pub struct MockRegistry {
    calls: Mutex<Vec<RegistryCall>>,
    stop_not_found: AtomicBool,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_stop_with_not_found(&self) {
        self.stop_not_found.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl RecordingRegistry for MockRegistry {
    fn start_recording(
        &self,
        key: SessionKey,
        command: StartCommand,
    ) -> Result<StartOutcome, RegistryError> {
        self.calls
            .lock()
            .unwrap()
            .push(RegistryCall::Start(key, command));
        Ok(StartOutcome::Started)
    }

    fn stop_recording(
        &self,
        key: SessionKey,
        actor: Option<Actor>,
    ) -> Result<StopOutcome, RegistryError> {
        if self.stop_not_found.load(Ordering::SeqCst) {
            return Err(RegistryError::NotFound(key));
        }
        self.calls
            .lock()
            .unwrap()
            .push(RegistryCall::Stop(key, actor));
        Ok(StopOutcome::Stopping)
    }

    fn session_count(&self) -> usize {
        0
    }

    fn abort_all(&self) {
        self.calls.lock().unwrap().push(RegistryCall::AbortAll);
    }
}
