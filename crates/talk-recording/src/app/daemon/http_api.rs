//! HTTP API through which call backends control recordings.

use axum::Json;
use axum::body::Body;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::adapters::BACKEND_HEADER;
use crate::adapters::CHECKSUM_HEADER;
use crate::adapters::CommandHeaders;
use crate::adapters::GatewayError;
use crate::adapters::GatewayErrorKind;
use crate::adapters::NONCE_HEADER;
use crate::adapters::RequestGateway;

mod error;
pub(crate) use error::ApiServerError;

const API_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct ApiServerHandle {
    shutdown_tx: Option<watch::Sender<bool>>,
    join: Option<thread::JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl ApiServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(join) = self.join.take() {
            let (done_tx, done_rx) = std_mpsc::channel();
            let _ = thread::Builder::new()
                .name("api-shutdown".to_string())
                .spawn(move || {
                    let _ = join.join();
                    let _ = done_tx.send(());
                });
            if done_rx.recv_timeout(API_SHUTDOWN_TIMEOUT * 2).is_err() {
                warn!("API server did not stop within shutdown timeout");
            }
        }
    }
}

#[derive(Clone)]
struct ApiState {
    gateway: Arc<RequestGateway>,
}

#[derive(Serialize)]
struct WelcomeResponse {
    version: &'static str,
}

#[derive(Serialize)]
struct EmptyResponse {}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
}

pub(crate) fn start_api_server(
    listen: &str,
    gateway: Arc<RequestGateway>,
) -> Result<ApiServerHandle, ApiServerError> {
    let (listener, local_addr) = bind_listener(listen)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(ApiState { gateway });

    let join = thread::Builder::new()
        .name("talk-recording-api".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build();
            let runtime = match runtime {
                Ok(rt) => rt,
                Err(err) => {
                    error!(error = %err, "Failed to build API runtime");
                    return;
                }
            };

            runtime.block_on(async move {
                let app = build_router(state);
                let listener = match TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(err) => {
                        error!(error = %err, "Failed to create async listener");
                        return;
                    }
                };
                info!(address = %local_addr, "API server listening");
                let mut shutdown_rx_server = shutdown_rx.clone();
                let mut shutdown_rx_wait = shutdown_rx;
                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx_server.changed().await;
                });
                let mut server_task = tokio::spawn(async move { server.await });

                tokio::select! {
                    join_result = &mut server_task => {
                        if let Err(err) = join_result {
                            error!(error = %err, "API server task failed");
                        }
                    }
                    changed = shutdown_rx_wait.changed() => {
                        if changed.is_err() {
                            warn!("API shutdown channel closed");
                        }
                        match tokio::time::timeout(API_SHUTDOWN_TIMEOUT, &mut server_task).await {
                            Ok(join_result) => {
                                if let Err(err) = join_result {
                                    error!(error = %err, "API server task failed");
                                }
                            }
                            Err(_) => {
                                warn!(
                                    timeout_ms = API_SHUTDOWN_TIMEOUT.as_millis(),
                                    "API server shutdown timed out; aborting"
                                );
                                server_task.abort();
                            }
                        }
                    }
                }
            });
        })
        .map_err(|e| ApiServerError::Io {
            operation: "spawn api thread",
            source: e,
        })?;

    Ok(ApiServerHandle {
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
        local_addr,
    })
}

fn build_router(state: Arc<ApiState>) -> axum::Router {
    axum::Router::new()
        .route("/api/v1/welcome", get(welcome_handler))
        .route("/api/v1/room/:token", post(room_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn welcome_handler() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn room_handler(
    State(state): State<Arc<ApiState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let command_headers = CommandHeaders {
        backend: header_str(&headers, BACKEND_HEADER),
        nonce: header_str(&headers, NONCE_HEADER),
        checksum: header_str(&headers, CHECKSUM_HEADER),
        content_length: header_str(&headers, CONTENT_LENGTH.as_str())
            .and_then(|value| value.trim().parse().ok()),
    };
    let request = match state.gateway.authorize(&command_headers) {
        Ok(request) => request,
        Err(err) => return gateway_error_response(&token, err),
    };

    let limit = usize::try_from(request.body_limit()).unwrap_or(usize::MAX);
    let body = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(token = %token, error = %err, "Failed to read command body");
            return error_response(StatusCode::BAD_REQUEST, "Could not read message body");
        }
    };

    // The registry takes locks and spawns worker threads.
    let gateway = Arc::clone(&state.gateway);
    let room = token.clone();
    let outcome =
        tokio::task::spawn_blocking(move || gateway.handle(&request, &room, &body)).await;
    match outcome {
        Ok(Ok(())) => (StatusCode::OK, Json(EmptyResponse {})).into_response(),
        Ok(Err(err)) => gateway_error_response(&token, err),
        Err(err) => {
            error!(token = %token, error = %err, "Command handler panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn gateway_error_response(token: &str, err: GatewayError) -> Response {
    let status = match err.kind() {
        GatewayErrorKind::Authentication => StatusCode::FORBIDDEN,
        GatewayErrorKind::Malformed => StatusCode::BAD_REQUEST,
        GatewayErrorKind::NotFound => StatusCode::NOT_FOUND,
        GatewayErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(token = %token, error = %err, "Command failed");
    } else {
        debug!(token = %token, error = %err, status = status.as_u16(), "Command rejected");
    }
    error_response(status, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

fn bind_listener(listen: &str) -> Result<(std::net::TcpListener, SocketAddr), ApiServerError> {
    let mut addrs = listen
        .to_socket_addrs()
        .map_err(|e| ApiServerError::InvalidListen {
            message: format!("{listen}: {e}"),
        })?;
    let addr = addrs.next().ok_or_else(|| ApiServerError::InvalidListen {
        message: format!("{listen}: no resolved address"),
    })?;

    let listener = std::net::TcpListener::bind(addr).map_err(|e| ApiServerError::Io {
        operation: "bind",
        source: e,
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|e| ApiServerError::Io {
            operation: "set non-blocking",
            source: e,
        })?;
    let local_addr = listener.local_addr().map_err(|e| ApiServerError::Io {
        operation: "read local address",
        source: e,
    })?;
    Ok((listener, local_addr))
}
