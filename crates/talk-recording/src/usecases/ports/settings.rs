use crate::domain::SessionSettings;

/// Resolves the per-backend values a new session needs.
pub trait BackendSettings: Send + Sync {
    fn session_settings(&self, backend: &str) -> SessionSettings;
}

/// Per-backend values needed to authenticate inbound commands.
pub trait GatewaySettings: Send + Sync {
    /// Shared secret of `backend`, `None` if the backend is not allowed.
    fn backend_secret(&self, backend: &str) -> Option<String>;

    /// Largest accepted command body, in bytes.
    fn max_message_size(&self, backend: &str) -> u64;
}
