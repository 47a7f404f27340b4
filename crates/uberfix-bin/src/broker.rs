//! Local request broker.
//!
//! One JSON request per connection over a Unix socket: the client writes the
//! request, shuts down its write half and reads one JSON response.

use crate::app::{AppState, Provider};
use otp_engine::api::{send_otp, verify_otp, SendOtpRequest, VerifyOtpRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MAX_REQUEST_BYTES: usize = 16 * 1024;
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Rate-limit identity when the peer's credentials cannot be read.
const LOCAL_CLIENT: &str = "local";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrokerRequest {
    SendOtp {
        #[serde(default)]
        phone: Option<String>,
        #[serde(default)]
        action_tag: Option<String>,
    },
    VerifyOtp {
        #[serde(default)]
        phone: Option<String>,
        #[serde(default)]
        otp: Option<String>,
    },
    LoadCredential {
        provider: Provider,
    },
    ResetCredential {
        provider: Provider,
    },
    ReferenceData {
        key: String,
    },
    Status,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BrokerResponse {
    pub ok: bool,
    /// HTTP-style status for OTP actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BrokerResponse {
    fn ok(data: Value) -> Self {
        Self {
            ok: true,
            status: None,
            data: Some(data),
            error: None,
        }
    }

    fn error(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: None,
            data: None,
            error: Some(error.into()),
        }
    }

    fn api(response: otp_engine::api::ApiResponse) -> Self {
        Self {
            ok: response.is_success(),
            status: Some(response.status),
            data: Some(response.body),
            error: None,
        }
    }
}

/// Runtime handles for a started broker.
pub struct BrokerRuntime {
    pub socket_path: PathBuf,
    pub shutdown_tx: oneshot::Sender<()>,
    pub task: JoinHandle<()>,
}

impl BrokerRuntime {
    /// Stop accepting connections and wait for the listener to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "Broker task ended abnormally");
        }
    }
}

/// Bind the socket (mode 0600) and serve requests until shut down.
pub async fn start_broker(socket_path: PathBuf, state: AppState) -> Result<BrokerRuntime, String> {
    if socket_path.exists() {
        std::fs::remove_file(&socket_path).map_err(|err| {
            format!(
                "failed to remove stale broker socket {}: {}",
                socket_path.display(),
                err
            )
        })?;
    }

    let listener = UnixListener::bind(&socket_path).map_err(|err| {
        format!(
            "failed to bind broker socket {}: {}",
            socket_path.display(),
            err
        )
    })?;

    if let Err(err) = std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600)) {
        warn!(
            socket = %socket_path.display(),
            error = %err,
            "Failed to tighten permissions on broker socket"
        );
    }

    let state = Arc::new(state);
    let socket_for_task = socket_path.clone();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        run_listener(listener, state, shutdown_rx).await;
        if let Err(err) = std::fs::remove_file(&socket_for_task) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    socket = %socket_for_task.display(),
                    error = %err,
                    "Failed removing broker socket during shutdown"
                );
            }
        }
    });

    info!(socket = %socket_path.display(), "Started local request broker");

    Ok(BrokerRuntime {
        socket_path,
        shutdown_tx,
        task,
    })
}

async fn run_listener(
    listener: UnixListener,
    state: Arc<AppState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Shutting down local request broker");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, state).await;
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "Failed accepting broker connection");
                    }
                }
            }
        }
    }
}

/// Rate-limit identity of the connected process, taken from the socket and
/// never from the request body.
fn peer_identity(stream: &UnixStream) -> String {
    match stream.peer_cred() {
        Ok(cred) => format!("uid:{}", cred.uid()),
        Err(err) => {
            debug!(error = %err, "Peer credentials unavailable");
            LOCAL_CLIENT.to_string()
        }
    }
}

async fn handle_connection(mut stream: UnixStream, state: Arc<AppState>) {
    let client = peer_identity(&stream);
    let response = match read_request(&mut stream, IO_TIMEOUT).await {
        Ok(request) => dispatch(&state, request, &client).await,
        Err(error) => BrokerResponse::error(error),
    };

    if let Err(err) = write_response(&mut stream, &response).await {
        debug!(error = %err, "Failed to answer broker client");
    }
}

/// Run one request from `client` against the application state.
pub async fn dispatch(state: &AppState, request: BrokerRequest, client: &str) -> BrokerResponse {
    match request {
        BrokerRequest::SendOtp { phone, action_tag } => {
            let request = SendOtpRequest {
                phone,
                action: action_tag,
            };
            BrokerResponse::api(send_otp(&state.otp, request, client).await)
        }
        BrokerRequest::VerifyOtp { phone, otp } => {
            BrokerResponse::api(verify_otp(&state.otp, VerifyOtpRequest { phone, otp }).await)
        }
        BrokerRequest::LoadCredential { provider } => {
            let loader = state.loader(provider);
            match loader.load().await {
                Ok(resource) => BrokerResponse::ok(json!({
                    "resource": resource,
                    "status": loader.status(),
                })),
                Err(err) => BrokerResponse::error(err.to_string()),
            }
        }
        BrokerRequest::ResetCredential { provider } => {
            let loader = state.loader(provider);
            loader.reset();
            BrokerResponse::ok(json!({ "status": loader.status() }))
        }
        BrokerRequest::ReferenceData { key } => match state.reference.get(&key).await {
            Ok(data) => match serde_json::to_value(&data) {
                Ok(value) => BrokerResponse::ok(value),
                Err(err) => BrokerResponse::error(format!("failed serializing reference data: {}", err)),
            },
            Err(err) => BrokerResponse::error(err.to_string()),
        },
        BrokerRequest::Status => BrokerResponse::ok(state.status().await),
    }
}

/// Read one request until EOF. `deadline` bounds the whole body, not each read.
async fn read_request<R>(stream: &mut R, deadline: Duration) -> Result<BrokerRequest, String>
where
    R: AsyncRead + Unpin,
{
    let bytes = tokio::time::timeout(deadline, read_body(stream))
        .await
        .map_err(|_| "timed out while reading broker request".to_string())??;

    if bytes.is_empty() {
        return Err("empty broker request body".to_string());
    }

    serde_json::from_slice(&bytes).map_err(|err| format!("invalid broker request JSON: {}", err))
}

async fn read_body<R>(stream: &mut R) -> Result<Vec<u8>, String>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::with_capacity(512);
    let mut chunk = [0_u8; 1024];

    loop {
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| format!("failed reading broker request: {}", err))?;

        if read == 0 {
            return Ok(bytes);
        }

        bytes.extend_from_slice(&chunk[..read]);
        if bytes.len() > MAX_REQUEST_BYTES {
            return Err("broker request body is too large".to_string());
        }
    }
}

async fn write_response(stream: &mut UnixStream, response: &BrokerResponse) -> Result<(), String> {
    let payload = serde_json::to_vec(response)
        .map_err(|err| format!("failed serializing broker response: {}", err))?;

    tokio::time::timeout(IO_TIMEOUT, stream.write_all(&payload))
        .await
        .map_err(|_| "timed out while writing broker response".to_string())?
        .map_err(|err| format!("failed writing broker response: {}", err))?;
    Ok(())
}
