mod notifier;

pub use notifier::HttpBackendNotifier;
