//! HTTP control surface for a [`DexAgent`]
//!
//! ```text
//! POST /rpc/memorydump  {"address": u64, "size": u64}  -> raw bytes
//! POST /rpc/switchmode  {"enabled": bool}              -> 204
//! POST /rpc/scandex                                    -> [{"address", "size"}]
//! GET  /health                                         -> {"status", "deep_search"}
//! ```

mod auth;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::{runtime::Builder as TokioRuntimeBuilder, signal as tokio_signal, task};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

pub use auth::{ApiToken, AuthError};

use crate::agent::DexAgent;
use crate::error::DumperError;
use crate::memory::MemoryAccess;
use crate::scanner::Candidate;

struct AppState<M> {
    agent: Arc<DexAgent<M>>,
}

impl<M> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            agent: Arc::clone(&self.agent),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DumpRequest {
    address: u64,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct SwitchModeRequest {
    enabled: bool,
}

pub fn build_router<M>(agent: Arc<DexAgent<M>>, token: ApiToken) -> Router
where
    M: MemoryAccess + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    let rpc = Router::new()
        .route("/rpc/memorydump", post(handle_memorydump::<M>))
        .route("/rpc/switchmode", post(handle_switchmode::<M>))
        .route("/rpc/scandex", post(handle_scandex::<M>))
        .route_layer(middleware::from_fn_with_state(token, auth::auth_middleware));

    Router::new()
        .merge(rpc)
        .route("/health", get(handle_health::<M>))
        .with_state(AppState { agent })
        .layer(cors)
}

/// Serve `agent` on `bind` until Ctrl+C.
pub fn run_rpc_server<M>(agent: DexAgent<M>, bind: &str) -> Result<()>
where
    M: MemoryAccess + Send + Sync + 'static,
{
    let runtime = TokioRuntimeBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("create tokio runtime")?;
    runtime.block_on(run_async(agent, bind.to_string()))
}

async fn run_async<M>(agent: DexAgent<M>, bind: String) -> Result<()>
where
    M: MemoryAccess + Send + Sync + 'static,
{
    let token = ApiToken::from_env();
    let authenticated = token.is_enabled();
    let app = build_router(Arc::new(agent), token);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind HTTP server to {bind}"))?;
    let addr: SocketAddr = listener.local_addr().context("resolve bound address")?;

    info!(authenticated, "RPC server listening on http://{addr}");
    info!("Endpoints: POST /rpc/memorydump, POST /rpc/switchmode, POST /rpc/scandex, GET /health");
    info!("Press Ctrl+C to stop the server.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio_signal::ctrl_c().await {
                error!("wait for Ctrl+C: {err}");
            }
        })
        .await
        .context("HTTP server error")?;

    info!("RPC server stopped");
    Ok(())
}

async fn handle_memorydump<M>(
    State(state): State<AppState<M>>,
    payload: Result<Json<DumpRequest>, JsonRejection>,
) -> Result<Response, ApiError>
where
    M: MemoryAccess + Send + Sync + 'static,
{
    let Json(DumpRequest { address, size }) = payload?;
    debug!("memorydump {address:#x} +{size:#x}");
    let bytes = blocking(&state, move |agent| agent.memorydump(address, size)).await?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

async fn handle_switchmode<M>(
    State(state): State<AppState<M>>,
    payload: Result<Json<SwitchModeRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError>
where
    M: MemoryAccess + Send + Sync + 'static,
{
    let Json(SwitchModeRequest { enabled }) = payload?;
    state.agent.switchmode(enabled);
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_scandex<M>(
    State(state): State<AppState<M>>,
) -> Result<Json<Vec<Candidate>>, ApiError>
where
    M: MemoryAccess + Send + Sync + 'static,
{
    let found = blocking(&state, |agent| agent.scandex()).await?;
    Ok(Json(found))
}

async fn handle_health<M>(State(state): State<AppState<M>>) -> Json<serde_json::Value>
where
    M: MemoryAccess + Send + Sync + 'static,
{
    Json(json!({
        "status": "ok",
        "deep_search": state.agent.is_deep_search(),
    }))
}

/// Run a memory operation off the async workers.
async fn blocking<M, T, F>(state: &AppState<M>, op: F) -> Result<T, ApiError>
where
    M: MemoryAccess + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&DexAgent<M>) -> crate::error::Result<T> + Send + 'static,
{
    let agent = Arc::clone(&state.agent);
    let result = task::spawn_blocking(move || op(agent.as_ref()))
        .await
        .map_err(|err| ApiError::internal(format!("worker task failed: {err}")))?;
    Ok(result?)
}

/// JSON error body with the status that matches the failure.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<DumperError> for ApiError {
    fn from(err: DumperError) -> Self {
        let status = match &err {
            DumperError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DumperError::UnreadableMemory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "RPC request failed: {}", self.message);
        } else {
            debug!(status = %self.status, "RPC request rejected: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
