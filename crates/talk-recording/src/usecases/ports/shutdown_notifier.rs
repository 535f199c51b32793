use std::sync::Arc;

/// Wakes whoever waits for the server to shut down.
pub trait ShutdownNotifier: Send + Sync {
    fn notify(&self);
}

pub type ShutdownNotifierHandle = Arc<dyn ShutdownNotifier>;
