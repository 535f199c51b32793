use std::path::Path;

use super::NotifyError;
use crate::domain::Actor;
use crate::domain::MediaMode;
use crate::domain::SessionKey;

/// Lifecycle notifications and uploads sent to the call backend.
///
/// Implementations retry transport failures themselves; an error means the
/// request was given up on.
pub trait BackendNotifier: Send + Sync {
    fn started(&self, key: &SessionKey, mode: MediaMode, actor: &Actor)
    -> Result<(), NotifyError>;

    fn stopped(&self, key: &SessionKey, actor: Option<&Actor>) -> Result<(), NotifyError>;

    fn failed(&self, key: &SessionKey) -> Result<(), NotifyError>;

    fn upload_recording(
        &self,
        key: &SessionKey,
        file: &Path,
        owner: &str,
    ) -> Result<(), NotifyError>;
}
