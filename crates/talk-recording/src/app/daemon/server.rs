//! Recording server runtime.

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::info;

use crate::adapters::RequestGateway;
use crate::app::daemon::http_api::ApiServerHandle;
use crate::app::daemon::http_api::start_api_server;
use crate::common::ServerError;
use crate::common::poison_recovery_count;
use crate::infra::backend::HttpBackendNotifier;
use crate::infra::daemon::ServerConfig;
use crate::infra::daemon::SessionRegistry;
use crate::infra::daemon::SignalHandler;
use crate::infra::media::SystemMediaEnvironment;
use crate::usecases::SessionDeps;
use crate::usecases::ports::BackendSettings;
use crate::usecases::ports::GatewaySettings;
use crate::usecases::ports::RecordingRegistry;
use crate::usecases::ports::ShutdownNotifier;
use crate::usecases::ports::ShutdownNotifierHandle;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct ChannelShutdownNotifier {
    tx: Sender<()>,
}

impl ShutdownNotifier for ChannelShutdownNotifier {
    fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

fn shutdown_channel() -> (ShutdownNotifierHandle, Receiver<()>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (Arc::new(ChannelShutdownNotifier { tx }), rx)
}

/// HTTP API plus the sessions it created.
struct RecordingServer {
    registry: Arc<SessionRegistry>,
    api: ApiServerHandle,
}

impl RecordingServer {
    fn start<S>(listen: &str, deps: SessionDeps, settings: Arc<S>) -> Result<Self, ServerError>
    where
        S: BackendSettings + GatewaySettings + 'static,
    {
        let registry = Arc::new(SessionRegistry::new(
            deps,
            Arc::clone(&settings) as Arc<dyn BackendSettings>,
        ));
        let gateway = Arc::new(RequestGateway::new(
            settings as Arc<dyn GatewaySettings>,
            Arc::clone(&registry) as Arc<dyn RecordingRegistry>,
        ));
        let api = start_api_server(listen, gateway)
            .map_err(|e| ServerError::ApiStart(e.to_string()))?;
        Ok(Self { registry, api })
    }

    fn local_addr(&self) -> SocketAddr {
        self.api.local_addr()
    }

    /// Stops accepting commands, then aborts what is still recording.
    fn shutdown(self) {
        self.api.shutdown();
        let active = self.registry.session_count();
        if active > 0 {
            info!(sessions = active, "Aborting active recordings");
        }
        self.registry.abort_all();
    }
}

fn wait_for_shutdown(shutdown: &AtomicBool, wakeup: &Receiver<()>) {
    while !shutdown.load(Ordering::SeqCst) {
        let _ = wakeup.recv_timeout(SHUTDOWN_POLL_INTERVAL);
    }
}

pub fn start_server(config: ServerConfig) -> Result<(), ServerError> {
    let config = Arc::new(config);
    let notifier = HttpBackendNotifier::new(Arc::clone(&config))
        .map_err(|e| ServerError::NotifierSetup(e.to_string()))?;
    let deps = SessionDeps {
        notifier: Arc::new(notifier),
        media: Arc::new(SystemMediaEnvironment::new(Arc::clone(&config))),
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let (shutdown_notifier, wakeup) = shutdown_channel();
    let _signal_handler = SignalHandler::setup(Arc::clone(&shutdown), shutdown_notifier)?;

    let server = RecordingServer::start(&config.listen(), deps, Arc::clone(&config))?;
    info!(
        address = %server.local_addr(),
        pid = std::process::id(),
        version = env!("CARGO_PKG_VERSION"),
        "Recording server started"
    );

    wait_for_shutdown(&shutdown, &wakeup);

    info!("Shutting down recording server...");
    server.shutdown();
    info!(
        poison_recoveries = poison_recovery_count(),
        "Recording server shutdown complete"
    );
    Ok(())
}
