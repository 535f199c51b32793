mod gate;
mod mock_media;
mod mock_notifier;
mod mock_registry;
mod static_settings;

pub use gate::Gate;
pub use mock_media::MediaEvent;
pub use mock_media::MediaStep;
pub use mock_media::MockMediaEnvironment;
pub use mock_notifier::MockNotifier;
pub use mock_notifier::NotifyEvent;
pub use mock_registry::MockRegistry;
pub use mock_registry::RegistryCall;
pub use static_settings::StaticSettings;
