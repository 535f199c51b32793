//! HTTP client for the call backend.
//!
//! Every request is signed with a fresh nonce and an HMAC-SHA256 checksum
//! keyed by the backend secret. Transport failures and error statuses are
//! retried up to [`MAX_ATTEMPTS`] times in total.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use reqwest::blocking::multipart::Form;
use reqwest::blocking::multipart::Part;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use url::Url;

use crate::adapters::CHECKSUM_HEADER;
use crate::adapters::NONCE_HEADER;
use crate::common::compute_checksum;
use crate::common::generate_nonce;
use crate::domain::Actor;
use crate::domain::MediaMode;
use crate::domain::SessionKey;
use crate::infra::daemon::ServerConfig;
use crate::usecases::ports::BackendNotifier;
use crate::usecases::ports::NotifyError;

pub const MAX_ATTEMPTS: u32 = 3;

const API_REQUEST_HEADER: &str = "OCS-ApiRequest";
const RECORDING_API_PATH: &str = "/ocs/v2.php/apps/spreed/api/v1/recording";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct HttpBackendNotifier {
    config: Arc<ServerConfig>,
    client: Client,
    insecure_client: Client,
}

/// Signing material of one logical request, shared by its retries.
struct Signature {
    nonce: String,
    checksum: String,
}

impl HttpBackendNotifier {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self, NotifyError> {
        let build = |insecure: bool| {
            Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(|e| NotifyError::Client(e.to_string()))
        };
        Ok(Self {
            config,
            client: build(false)?,
            insecure_client: build(true)?,
        })
    }

    fn client_for(&self, backend: &str) -> &Client {
        if self.config.skip_verify(backend) {
            &self.insecure_client
        } else {
            &self.client
        }
    }

    fn sign(&self, backend: &str, data: &[u8]) -> Result<Signature, NotifyError> {
        let secret = self
            .config
            .backend_secret(backend)
            .ok_or_else(|| NotifyError::MissingSecret(backend.to_string()))?;
        let nonce = generate_nonce();
        let checksum = compute_checksum(secret.as_bytes(), nonce.as_bytes(), data)
            .map_err(|e| NotifyError::Signing(e.to_string()))?;
        Ok(Signature { nonce, checksum })
    }

    fn send_message(&self, key: &SessionKey, message: &Value) -> Result<(), NotifyError> {
        let url = endpoint(key.backend(), "/backend")?;
        let body = message.to_string().into_bytes();
        let signature = self.sign(key.backend(), &body)?;
        let client = self.client_for(key.backend());
        debug!(
            backend = %key.backend(),
            backend_id = self.config.backend_id(key.backend()).unwrap_or("*"),
            token = %key.token(),
            "Sending message to backend"
        );

        send_with_retries(&url, || {
            client
                .post(url.clone())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(API_REQUEST_HEADER, "true")
                .header(NONCE_HEADER, &signature.nonce)
                .header(CHECKSUM_HEADER, &signature.checksum)
                .body(body.clone())
        })
    }
}

/// `<backend>/ocs/v2.php/apps/spreed/api/v1/recording<suffix>`
fn endpoint(backend: &str, suffix: &str) -> Result<Url, NotifyError> {
    let raw = format!(
        "{}{}{}",
        backend.trim_end_matches('/'),
        RECORDING_API_PATH,
        suffix
    );
    Url::parse(&raw).map_err(|e| NotifyError::InvalidUrl {
        url: raw,
        reason: e.to_string(),
    })
}

fn send_with_retries(
    url: &Url,
    mut build: impl FnMut() -> RequestBuilder,
) -> Result<(), NotifyError> {
    let mut attempt = 1;
    loop {
        let result = build()
            .send()
            .and_then(|response| response.error_for_status())
            .map(|_| ());
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!(
                    url = %url,
                    attempt,
                    retries_left = MAX_ATTEMPTS - attempt,
                    error = %e,
                    "Failed to send message to backend"
                );
                attempt += 1;
            }
            Err(e) => {
                error!(url = %url, attempt, error = %e, "Failed to send message to backend, giving up");
                return Err(NotifyError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn actor_json(actor: &Actor) -> Value {
    json!({ "type": actor.kind, "id": actor.id })
}

impl BackendNotifier for HttpBackendNotifier {
    fn started(&self, key: &SessionKey, mode: MediaMode, actor: &Actor) -> Result<(), NotifyError> {
        self.send_message(
            key,
            &json!({
                "type": "started",
                "started": {
                    "token": key.token(),
                    "status": u8::from(mode),
                    "actor": actor_json(actor),
                },
            }),
        )
    }

    fn stopped(&self, key: &SessionKey, actor: Option<&Actor>) -> Result<(), NotifyError> {
        let mut stopped = json!({ "token": key.token() });
        if let Some(actor) = actor {
            stopped["actor"] = actor_json(actor);
        }
        self.send_message(key, &json!({ "type": "stopped", "stopped": stopped }))
    }

    fn failed(&self, key: &SessionKey) -> Result<(), NotifyError> {
        self.send_message(
            key,
            &json!({ "type": "failed", "failed": { "token": key.token() } }),
        )
    }

    /// The checksum covers the token: the multipart body is not signed.
    fn upload_recording(
        &self,
        key: &SessionKey,
        file: &Path,
        owner: &str,
    ) -> Result<(), NotifyError> {
        info!(
            backend = %key.backend(),
            token = %key.token(),
            owner,
            path = %file.display(),
            "Uploading recording"
        );

        let url = endpoint(key.backend(), &format!("/{}/store", key.token()))?;
        let contents = std::fs::read(file).map_err(|source| NotifyError::ReadFile {
            path: file.to_path_buf(),
            source,
        })?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let signature = self.sign(key.backend(), key.token().as_bytes())?;
        let client = self.client_for(key.backend());
        debug!(
            backend = %key.backend(),
            backend_id = self.config.backend_id(key.backend()).unwrap_or("*"),
            token = %key.token(),
            "Sending message to backend"
        );

        send_with_retries(&url, || {
            let form = Form::new()
                .text("owner", owner.to_string())
                .part(
                    "file",
                    Part::bytes(contents.clone()).file_name(file_name.clone()),
                );
            client
                .post(url.clone())
                .header(API_REQUEST_HEADER, "true")
                .header(NONCE_HEADER, &signature.nonce)
                .header(CHECKSUM_HEADER, &signature.checksum)
                .multipart(form)
        })
    }
}
