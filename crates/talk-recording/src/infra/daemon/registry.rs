//! In-memory registry of recording sessions.
//!
//! A single map guarded by one mutex holds every tracked session together
//! with its phase, so a key can never be both active and stopping. Session
//! work always runs on worker threads, outside the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::common::mutex_lock_or_recover;
use crate::domain::Actor;
use crate::domain::SessionKey;
use crate::domain::StartCommand;
use crate::usecases::RecordingSession;
use crate::usecases::SessionDeps;
use crate::usecases::ports::BackendSettings;
use crate::usecases::ports::RecordingRegistry;
use crate::usecases::ports::RegistryError;
use crate::usecases::ports::SessionPhase;
use crate::usecases::ports::StartOutcome;
use crate::usecases::ports::StopOutcome;

struct RegistryEntry {
    session: Arc<RecordingSession>,
    phase: SessionPhase,
}

type SessionMap = Arc<Mutex<HashMap<SessionKey, RegistryEntry>>>;

pub struct SessionRegistry {
    sessions: SessionMap,
    deps: SessionDeps,
    settings: Arc<dyn BackendSettings>,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps, settings: Arc<dyn BackendSettings>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            deps,
            settings,
        }
    }

    /// Reports a start that could not be honoured, so the backend does not
    /// keep the call waiting for a recording.
    fn reject_start(&self, key: SessionKey) {
        let notifier = Arc::clone(&self.deps.notifier);
        let name = format!("recording-reject-{}", key.token());
        let spawned = thread::Builder::new().name(name).spawn(move || {
            if let Err(e) = notifier.failed(&key) {
                error!(
                    backend = %key.backend(),
                    token = %key.token(),
                    error = %e,
                    "Failed to report rejected start"
                );
            }
        });
        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn notification worker");
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self, key: &SessionKey) -> Option<SessionPhase> {
        mutex_lock_or_recover(&self.sessions)
            .get(key)
            .map(|entry| entry.phase)
    }
}

/// Removes `key` if it still maps to `session` in `phase`.
fn remove_if_current(
    sessions: &SessionMap,
    session: &Arc<RecordingSession>,
    phase: SessionPhase,
) -> bool {
    let mut map = mutex_lock_or_recover(sessions);
    let key = session.key();
    let current = map
        .get(key)
        .is_some_and(|entry| Arc::ptr_eq(&entry.session, session) && entry.phase == phase);
    if current {
        map.remove(key);
    }
    current
}

fn run_start(sessions: SessionMap, session: Arc<RecordingSession>, actor: Actor) {
    let key = session.key().clone();
    match session.start(&actor) {
        Ok(()) => debug!(
            backend = %key.backend(),
            token = %key.token(),
            started = session.is_started(),
            "Recording worker finished"
        ),
        Err(err) => {
            if remove_if_current(&sessions, &session, SessionPhase::Active) {
                error!(
                    backend = %key.backend(),
                    token = %key.token(),
                    error = %err,
                    "Failed to start recording"
                );
            } else {
                info!(
                    backend = %key.backend(),
                    token = %key.token(),
                    reason = %err,
                    "Recording stopped before starting"
                );
            }
        }
    }
}

fn run_stop(sessions: SessionMap, session: Arc<RecordingSession>, actor: Option<Actor>) {
    let key = session.key().clone();
    if let Err(err) = session.stop(actor.as_ref()) {
        error!(
            backend = %key.backend(),
            token = %key.token(),
            error = %err,
            "Failed to stop recording"
        );
    }
    if !remove_if_current(&sessions, &session, SessionPhase::Stopping) {
        error!(
            backend = %key.backend(),
            token = %key.token(),
            "Recording stopped while not tracked as stopping"
        );
    }
}

impl RecordingRegistry for SessionRegistry {
    fn start_recording(
        &self,
        key: SessionKey,
        command: StartCommand,
    ) -> Result<StartOutcome, RegistryError> {
        let StartCommand {
            media_mode,
            owner,
            actor,
        } = command;

        let session = {
            let mut sessions = mutex_lock_or_recover(&self.sessions);
            let existing = sessions.get(&key).map(|entry| entry.phase);
            match existing {
                Some(SessionPhase::Active) => {
                    warn!(
                        backend = %key.backend(),
                        token = %key.token(),
                        "Trying to start recording again"
                    );
                    return Ok(StartOutcome::AlreadyActive);
                }
                Some(SessionPhase::Stopping) => None,
                None => {
                    let session = Arc::new(RecordingSession::new(
                        key.clone(),
                        media_mode,
                        owner,
                        self.settings.session_settings(key.backend()),
                        self.deps.clone(),
                    ));
                    sessions.insert(
                        key.clone(),
                        RegistryEntry {
                            session: Arc::clone(&session),
                            phase: SessionPhase::Active,
                        },
                    );
                    Some(session)
                }
            }
        };
        let Some(session) = session else {
            warn!(
                backend = %key.backend(),
                token = %key.token(),
                actor_type = %actor.kind,
                actor_id = %actor.id,
                "Trying to start recording while the previous one is stopping"
            );
            self.reject_start(key);
            return Ok(StartOutcome::StillStopping);
        };

        let sessions = Arc::clone(&self.sessions);
        let worker_session = Arc::clone(&session);
        let spawned = thread::Builder::new()
            .name(format!("recording-start-{}", key.token()))
            .spawn(move || run_start(sessions, worker_session, actor));

        if let Err(e) = spawned {
            remove_if_current(&self.sessions, &session, SessionPhase::Active);
            return Err(RegistryError::WorkerSpawn {
                key,
                reason: e.to_string(),
            });
        }
        Ok(StartOutcome::Started)
    }

    fn stop_recording(
        &self,
        key: SessionKey,
        actor: Option<Actor>,
    ) -> Result<StopOutcome, RegistryError> {
        let session = {
            let mut sessions = mutex_lock_or_recover(&self.sessions);
            let Some(entry) = sessions.get_mut(&key) else {
                warn!(
                    backend = %key.backend(),
                    token = %key.token(),
                    "Trying to stop unknown recording"
                );
                return Err(RegistryError::NotFound(key));
            };
            if entry.phase == SessionPhase::Stopping {
                info!(
                    backend = %key.backend(),
                    token = %key.token(),
                    "Trying to stop recording again"
                );
                return Ok(StopOutcome::AlreadyStopping);
            }
            entry.phase = SessionPhase::Stopping;
            Arc::clone(&entry.session)
        };

        let sessions = Arc::clone(&self.sessions);
        let worker_session = Arc::clone(&session);
        let spawned = thread::Builder::new()
            .name(format!("recording-stop-{}", key.token()))
            .spawn(move || run_stop(sessions, worker_session, actor));

        if let Err(e) = spawned {
            let mut sessions = mutex_lock_or_recover(&self.sessions);
            if let Some(entry) = sessions.get_mut(&key) {
                if Arc::ptr_eq(&entry.session, &session) {
                    entry.phase = SessionPhase::Active;
                }
            }
            return Err(RegistryError::WorkerSpawn {
                key,
                reason: e.to_string(),
            });
        }
        Ok(StopOutcome::Stopping)
    }

    fn session_count(&self) -> usize {
        mutex_lock_or_recover(&self.sessions).len()
    }

    fn abort_all(&self) {
        let active: Vec<Arc<RecordingSession>> = {
            let mut sessions = mutex_lock_or_recover(&self.sessions);
            let keys: Vec<SessionKey> = sessions
                .iter()
                .filter(|(_, entry)| entry.phase == SessionPhase::Active)
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter()
                .filter_map(|key| sessions.remove(key))
                .map(|entry| entry.session)
                .collect()
        };

        for session in active {
            info!(
                backend = %session.key().backend(),
                token = %session.key().token(),
                "Aborting recording"
            );
            session.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::domain::MediaMode;
    use crate::test_support::Gate;
    use crate::test_support::MediaEvent;
    use crate::test_support::MediaStep;
    use crate::test_support::MockMediaEnvironment;
    use crate::test_support::MockNotifier;
    use crate::test_support::StaticSettings;
    use crate::test_support::wait_until;
    use crate::usecases::ports::BackendNotifier;
    use crate::usecases::ports::MediaEnvironment;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Fixture {
        _dir: TempDir,
        notifier: Arc<MockNotifier>,
        media: Arc<MockMediaEnvironment>,
        registry: SessionRegistry,
    }

    fn fixture_with(notifier: MockNotifier, media: MockMediaEnvironment) -> Fixture {
        let dir = TempDir::new().unwrap();
        let notifier = Arc::new(notifier);
        let media = Arc::new(media);
        let registry = SessionRegistry::new(
            SessionDeps {
                notifier: Arc::clone(&notifier) as Arc<dyn BackendNotifier>,
                media: Arc::clone(&media) as Arc<dyn MediaEnvironment>,
            },
            Arc::new(StaticSettings::new(dir.path())),
        );
        Fixture {
            _dir: dir,
            notifier,
            media,
            registry,
        }
    }

    fn fixture(media: MockMediaEnvironment) -> Fixture {
        fixture_with(MockNotifier::new(), media)
    }

    fn key(token: &str) -> SessionKey {
        SessionKey::new("b1", token)
    }

    fn start_command() -> StartCommand {
        StartCommand {
            media_mode: MediaMode::AudioOnly,
            owner: "alice".to_string(),
            actor: Actor::new("users", "alice"),
        }
    }

    fn wait_recording(f: &Fixture) {
        assert!(wait_until(TIMEOUT, || f.media.recorders_waiting() == 1));
    }

    #[test]
    fn test_start_registers_session_immediately() {
        let f = fixture(MockMediaEnvironment::new());

        let outcome = f.registry.start_recording(key("t1"), start_command()).unwrap();

        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(f.registry.phase(&key("t1")), Some(SessionPhase::Active));
        assert!(wait_until(TIMEOUT, || f.notifier.started_count() == 1));
        f.registry.abort_all();
    }

    #[test]
    fn test_duplicate_start_is_noop() {
        let f = fixture(MockMediaEnvironment::new());

        f.registry.start_recording(key("t1"), start_command()).unwrap();
        let outcome = f.registry.start_recording(key("t1"), start_command()).unwrap();

        assert_eq!(outcome, StartOutcome::AlreadyActive);
        assert_eq!(f.registry.session_count(), 1);
        wait_recording(&f);
        assert_eq!(f.notifier.started_count(), 1);
        let displays = f
            .media
            .events()
            .iter()
            .filter(|e| **e == MediaEvent::DisplayAcquired)
            .count();
        assert_eq!(displays, 1);
        f.registry.abort_all();
    }

    #[test]
    fn test_stop_unknown_is_not_found() {
        let f = fixture(MockMediaEnvironment::new());

        let err = f.registry.stop_recording(key("t1"), None).unwrap_err();

        assert!(matches!(err, RegistryError::NotFound(k) if k == key("t1")));
        assert!(f.notifier.events().is_empty());
    }

    #[test]
    fn test_start_then_stop_uploads_and_forgets_session() {
        let f = fixture(MockMediaEnvironment::new());
        f.registry.start_recording(key("t1"), start_command()).unwrap();
        wait_recording(&f);
        let output = f.media.recorder_output().unwrap();
        assert!(output.exists());

        let outcome = f
            .registry
            .stop_recording(key("t1"), Some(Actor::new("users", "bob")))
            .unwrap();

        assert_eq!(outcome, StopOutcome::Stopping);
        assert!(wait_until(TIMEOUT, || f.registry.phase(&key("t1")).is_none()));
        assert_eq!(f.notifier.started_count(), 1);
        assert_eq!(f.notifier.stopped_count(), 1);
        assert_eq!(f.notifier.uploaded_count(), 1);
        assert_eq!(f.notifier.failed_count(), 0);
        assert!(wait_until(TIMEOUT, || {
            f.media.events().contains(&MediaEvent::RecorderTerminated)
        }));
        assert!(!output.exists());
    }

    #[test]
    fn test_stop_before_display_ready() {
        let gate = Gate::closed();
        let f = fixture(MockMediaEnvironment::new().gated_at(MediaStep::Display, Arc::clone(&gate)));
        f.registry.start_recording(key("t1"), start_command()).unwrap();
        assert!(wait_until(TIMEOUT, || gate.has_waiter()));

        f.registry.stop_recording(key("t1"), None).unwrap();
        assert!(wait_until(TIMEOUT, || f.registry.phase(&key("t1")).is_none()));
        gate.open();

        assert!(wait_until(TIMEOUT, || {
            f.media.events().contains(&MediaEvent::DisplayReleased)
        }));
        let events = f.media.events();
        assert!(!events.iter().any(|e| matches!(e, MediaEvent::CallJoined(_))));
        assert!(!events.iter().any(|e| matches!(e, MediaEvent::AudioSinkAcquired(_))));
        assert_eq!(f.notifier.stopped_count(), 1);
        assert_eq!(f.notifier.failed_count(), 0);
        assert_eq!(f.notifier.uploaded_count(), 0);
        assert_eq!(f.registry.session_count(), 0);
    }

    #[test]
    fn test_duplicate_stop_is_noop() {
        let gate = Gate::closed();
        let f = fixture_with(
            MockNotifier::new().gated_stopped(Arc::clone(&gate)),
            MockMediaEnvironment::new(),
        );
        f.registry.start_recording(key("t1"), start_command()).unwrap();
        wait_recording(&f);

        f.registry.stop_recording(key("t1"), None).unwrap();
        let outcome = f.registry.stop_recording(key("t1"), None).unwrap();

        assert_eq!(outcome, StopOutcome::AlreadyStopping);
        assert_eq!(f.registry.phase(&key("t1")), Some(SessionPhase::Stopping));
        gate.open();
        assert!(wait_until(TIMEOUT, || f.registry.phase(&key("t1")).is_none()));
        assert_eq!(f.notifier.stopped_count(), 1);
    }

    #[test]
    fn test_start_while_stopping_reports_failure() {
        let gate = Gate::closed();
        let f = fixture_with(
            MockNotifier::new().gated_stopped(Arc::clone(&gate)),
            MockMediaEnvironment::new(),
        );
        f.registry.start_recording(key("t1"), start_command()).unwrap();
        wait_recording(&f);
        f.registry.stop_recording(key("t1"), None).unwrap();

        let outcome = f.registry.start_recording(key("t1"), start_command()).unwrap();

        assert_eq!(outcome, StartOutcome::StillStopping);
        assert_eq!(f.registry.session_count(), 1);
        assert!(wait_until(TIMEOUT, || f.notifier.failed_count() == 1));
        gate.open();
        assert!(wait_until(TIMEOUT, || f.registry.session_count() == 0));
        assert_eq!(f.notifier.started_count(), 1);

        let outcome = f.registry.start_recording(key("t1"), start_command()).unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert!(wait_until(TIMEOUT, || f.notifier.started_count() == 2));
        f.registry.abort_all();
        assert_eq!(f.notifier.failed_count(), 1);
    }

    #[test]
    fn test_failed_start_removes_session() {
        let f = fixture(MockMediaEnvironment::new().with_recorder_exit(1));

        f.registry.start_recording(key("t1"), start_command()).unwrap();

        assert!(wait_until(TIMEOUT, || f.registry.phase(&key("t1")).is_none()));
        assert!(wait_until(TIMEOUT, || f.notifier.failed_count() == 1));
        assert_eq!(f.notifier.stopped_count(), 0);
        assert_eq!(f.media.events().last(), Some(&MediaEvent::DisplayReleased));
    }

    #[test]
    fn test_abort_all_tears_down_without_notifying() {
        let f = fixture(MockMediaEnvironment::new());
        f.registry.start_recording(key("t1"), start_command()).unwrap();
        f.registry.start_recording(key("t2"), start_command()).unwrap();
        assert!(wait_until(TIMEOUT, || f.notifier.started_count() == 2));
        assert!(wait_until(TIMEOUT, || f.media.recorders_waiting() == 2));

        f.registry.abort_all();

        assert_eq!(f.registry.session_count(), 0);
        assert!(wait_until(TIMEOUT, || {
            f.media
                .events()
                .iter()
                .filter(|e| **e == MediaEvent::DisplayReleased)
                .count()
                == 2
        }));
        assert_eq!(f.notifier.stopped_count(), 0);
        assert_eq!(f.notifier.failed_count(), 0);
    }

    #[test]
    fn test_independent_calls_record_concurrently() {
        let f = fixture(MockMediaEnvironment::new());
        let tokens: Vec<String> = (0..8).map(|i| format!("call{i}")).collect();

        for token in &tokens {
            f.registry.start_recording(key(token), start_command()).unwrap();
        }
        assert_eq!(f.registry.session_count(), tokens.len());
        assert!(wait_until(TIMEOUT, || f.media.recorders_waiting() == tokens.len()));

        for token in &tokens {
            f.registry.stop_recording(key(token), None).unwrap();
        }

        assert!(wait_until(TIMEOUT, || f.registry.session_count() == 0));
        assert_eq!(f.notifier.started_count(), tokens.len());
        assert_eq!(f.notifier.stopped_count(), tokens.len());
        assert_eq!(f.notifier.uploaded_count(), tokens.len());
        assert_eq!(f.notifier.failed_count(), 0);
    }
}
