//! Server signal handling.

use signal_hook::consts::SIGINT;
use signal_hook::consts::SIGTERM;
use signal_hook::iterator::Signals;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use tracing::info;

use crate::common::ServerError;
use crate::usecases::ports::ShutdownNotifierHandle;

pub struct SignalHandler {
    _handle: JoinHandle<()>,
}

impl SignalHandler {
    /// Raises `shutdown` and wakes `notifier` on the first SIGINT or SIGTERM.
    pub fn setup(
        shutdown: Arc<AtomicBool>,
        notifier: ShutdownNotifierHandle,
    ) -> Result<Self, ServerError> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|e| ServerError::SignalSetup(e.to_string()))?;

        let handle = thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!(signal = sig, "Received signal, stopping recording server");
                    shutdown.store(true, Ordering::SeqCst);
                    notifier.notify();
                }
            })
            .map_err(|e| {
                ServerError::SignalSetup(format!("failed to spawn signal handler: {e}"))
            })?;

        Ok(Self { _handle: handle })
    }
}
