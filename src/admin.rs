use crate::auth::Credentials;
use crate::error::{json_error, AdminErrorCode};
use crate::merge::merge_secrets;
use crate::secrets::mask_secrets;
use crate::status::{channel_summary, load_cron_jobs, provider_summary};
use crate::store::ConfigStore;
use crate::supervisor::GatewaySupervisor;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Version information for the control plane
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Field of a config write that asks for a gateway restart once saved
pub const RESTART_FIELD: &str = "_restartGateway";

/// Helper to create a JSON response
fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("valid response with StatusCode enum and static header")
}

/// Everything a request handler needs
pub struct AdminState {
    pub home: PathBuf,
    pub store: Arc<ConfigStore>,
    pub supervisor: Arc<GatewaySupervisor>,
    pub credentials: Credentials,
}

impl AdminState {
    /// State for the gateway home directory `home`; the document lives at
    /// `<home>/config.json`
    pub fn new(
        home: impl Into<PathBuf>,
        supervisor: Arc<GatewaySupervisor>,
        credentials: Credentials,
    ) -> Self {
        let home = home.into();
        Self {
            store: Arc::new(ConfigStore::in_home(&home)),
            home,
            supervisor,
            credentials,
        }
    }
}

/// Control surface: config editing, gateway lifecycle and status
pub struct AdminServer {
    bind_addr: SocketAddr,
    state: Arc<AdminState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl AdminServer {
    pub fn new(bind_addr: SocketAddr, state: AdminState, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            bind_addr,
            state: Arc::new(state),
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Admin server listening (HTTP/1.1 and HTTP/2)");

        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                if let Err(e) = serve_admin_connection(stream, state).await {
                                    debug!(addr = %addr, error = %e, "Admin connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept admin connection");
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Admin server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_admin_connection<S>(stream: S, state: Arc<AdminState>) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let state = Arc::clone(&state);
        async move { handle_admin_request(req, state).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Admin connection error: {}", e))?;

    Ok(())
}

async fn handle_admin_request(
    req: Request<Incoming>,
    state: Arc<AdminState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!(%method, %path, "Admin API request");

    let response = match (&method, path.as_str()) {
        // Health and version need no credentials
        (&Method::GET, "/health") => json_response(
            StatusCode::OK,
            &json!({"status": "ok", "gateway": state.supervisor.state()}),
        ),
        (&Method::GET, "/version") => {
            json_response(StatusCode::OK, &json!({"name": PKG_NAME, "version": VERSION}))
        }

        _ if !state.credentials.check(req.headers()) => {
            warn!(%path, "Unauthorized admin API request");
            json_error(AdminErrorCode::Unauthorized, "Unauthorized")
        }

        (&Method::GET, "/api/config") => {
            let document = state.store.load();
            json_response(StatusCode::OK, &mask_secrets(&document))
        }
        (&Method::PUT, "/api/config") => put_config(req, &state).await,

        (&Method::GET, "/api/status") => {
            let document = state.store.load();
            json_response(
                StatusCode::OK,
                &json!({
                    "gateway": state.supervisor.status(),
                    "providers": provider_summary(&document),
                    "channels": channel_summary(&document),
                    "cron": load_cron_jobs(&state.home),
                }),
            )
        }
        (&Method::GET, "/api/logs") => {
            json_response(StatusCode::OK, &json!({"lines": state.supervisor.logs()}))
        }

        (&Method::POST, "/api/gateway/start") => {
            let supervisor = Arc::clone(&state.supervisor);
            tokio::spawn(async move { supervisor.start().await });
            json_response(StatusCode::OK, &json!({"ok": true}))
        }
        (&Method::POST, "/api/gateway/stop") => {
            let supervisor = Arc::clone(&state.supervisor);
            tokio::spawn(async move { supervisor.stop().await });
            json_response(StatusCode::OK, &json!({"ok": true}))
        }
        (&Method::POST, "/api/gateway/restart") => {
            let supervisor = Arc::clone(&state.supervisor);
            tokio::spawn(async move { supervisor.restart().await });
            json_response(StatusCode::OK, &json!({"ok": true}))
        }

        _ => json_error(AdminErrorCode::NotFound, "not found"),
    };

    Ok(response)
}

/// Save a config document submitted by the UI.
///
/// Masked secrets in the body are resolved against the stored document so a
/// round trip through `GET /api/config` never overwrites a real key.
async fn put_config(req: Request<Incoming>, state: &AdminState) -> Response<Full<Bytes>> {
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return json_error(
                AdminErrorCode::InvalidPayload,
                format!("Failed to read request body: {}", e),
            )
        }
    };

    let mut document: Value = match serde_json::from_slice(&body) {
        Ok(document) => document,
        Err(e) => {
            debug!(error = %e, "Rejected config write with invalid JSON");
            return json_error(AdminErrorCode::InvalidJson, "Invalid JSON");
        }
    };

    let restart = match take_restart_flag(&mut document) {
        Ok(restart) => restart,
        Err(msg) => return json_error(AdminErrorCode::InvalidPayload, msg),
    };

    let store = Arc::clone(&state.store);
    let saved = tokio::task::spawn_blocking(move || {
        store.update(|existing| merge_secrets(document, existing))
    })
    .await;

    match saved {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            error!(error = %e, "Failed to save config");
            return json_error(AdminErrorCode::InternalError, e.to_string());
        }
        Err(e) => {
            error!(error = %e, "Config update task failed");
            return json_error(AdminErrorCode::InternalError, "Config update failed");
        }
    }

    info!(restart, "Config updated");
    if restart {
        let supervisor = Arc::clone(&state.supervisor);
        tokio::spawn(async move { supervisor.restart().await });
    }

    json_response(StatusCode::OK, &json!({"ok": true, "restarting": restart}))
}

/// Check that a submitted document is an object and strip the restart
/// request from it
fn take_restart_flag(document: &mut Value) -> Result<bool, String> {
    let Some(map) = document.as_object_mut() else {
        return Err("Config must be a JSON object".to_string());
    };

    match map.remove(RESTART_FIELD) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(restart)) => Ok(restart),
        Some(_) => Err(format!("{} must be a boolean", RESTART_FIELD)),
    }
}
