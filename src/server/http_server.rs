use super::ApiError;
use crate::config::StageConfig;
use crate::error::{StageError, StageResult};
use crate::models::Scope;
use crate::services::{
    self, AddInput, AddOutput, ApplyInput, ApplyOutput, CancelTagInput, CancelTagOutput,
    DeleteInput, DeleteOutput, DiffInput, DiffOutput, DrainInput, DrainOutput, EditInput,
    EditOutput, PersistInput, PersistOutput, ResetInput, ResetResult, StatusInput, StatusOutput,
    TagInput, TagOutput, UntagInput,
};
use crate::store::{AgentRegistry, FileStore, MemoryStore, Passphrase};
use crate::strategy::{ServiceStrategy, StrategyFactory};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const ACCOUNT_HEADER: &str = "x-paramstage-account";
pub const REGION_HEADER: &str = "x-paramstage-region";

// =============================================================================
// Application State
// =============================================================================

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Resident stores, one per scope
    pub registry: Arc<AgentRegistry>,
    pub factory: StrategyFactory,
    /// Scope used when a request names none
    pub default_scope: Scope,
    /// Root of the staging files drain/persist work against
    pub stage_dir: PathBuf,
    pub passphrase: Option<Passphrase>,
    /// Cancelled on shutdown; every request runs under a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: &StageConfig, factory: StrategyFactory) -> Self {
        Self {
            registry: Arc::new(AgentRegistry::new()),
            factory,
            default_scope: config.scope(),
            stage_dir: config.stage_dir(),
            passphrase: config.passphrase(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Scope named by the request headers, falling back to the defaults
    fn scope(&self, headers: &HeaderMap) -> Result<Scope, ApiError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let scope = Scope::new(
            header(ACCOUNT_HEADER).unwrap_or_else(|| self.default_scope.account_id.clone()),
            header(REGION_HEADER).unwrap_or_else(|| self.default_scope.region.clone()),
        );
        scope.validate()?;
        Ok(scope)
    }

    fn store(&self, headers: &HeaderMap) -> Result<Arc<MemoryStore>, ApiError> {
        Ok(self.registry.store(&self.scope(headers)?))
    }

    fn file(&self, headers: &HeaderMap) -> Result<FileStore, ApiError> {
        let file = FileStore::for_scope(&self.stage_dir, &self.scope(headers)?)?;
        Ok(file.with_passphrase(self.passphrase.clone()))
    }

    /// Resident store, strategy and cancellation token for one request
    fn resolve(
        &self,
        headers: &HeaderMap,
        service: &str,
    ) -> Result<(Arc<MemoryStore>, Box<dyn ServiceStrategy>, CancellationToken), ApiError> {
        let strategy = self.factory.create_from_tag(service)?;
        Ok((self.store(headers)?, strategy, self.shutdown.child_token()))
    }
}

/// Body of every per-service route: the service tag plus the use-case input
#[derive(Debug, Deserialize)]
pub struct ServiceRequest<T> {
    pub service: String,
    #[serde(flatten)]
    pub input: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelTagKind {
    Add,
    Remove,
}

#[derive(Debug, Deserialize)]
pub struct CancelTagRequest {
    pub kind: CancelTagKind,
    #[serde(flatten)]
    pub input: CancelTagInput,
}

#[derive(Debug, Serialize)]
struct ScopeList {
    scopes: Vec<String>,
}

// =============================================================================
// Server Startup
// =============================================================================

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/scopes", get(list_scopes))
        .route("/v1/status", post(handle_status))
        .route("/v1/add", post(handle_add))
        .route("/v1/edit", post(handle_edit))
        .route("/v1/delete", post(handle_delete))
        .route("/v1/tag", post(handle_tag))
        .route("/v1/untag", post(handle_untag))
        .route("/v1/cancel-tag", post(handle_cancel_tag))
        .route("/v1/reset", post(handle_reset))
        .route("/v1/diff", post(handle_diff))
        .route("/v1/apply", post(handle_apply))
        .route("/v1/drain", post(handle_drain))
        .route("/v1/persist", post(handle_persist))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM
pub async fn start_server(config: &StageConfig, factory: StrategyFactory) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    let state = AppState::new(config, factory);
    let shutdown = state.shutdown.clone();
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, scope = %config.scope(), "Starting staging agent");
    println!("✓ Staging agent listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;
    info!("Staging agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_check() -> &'static str {
    "OK"
}

async fn list_scopes(State(state): State<AppState>) -> Json<ScopeList> {
    let scopes = state
        .registry
        .scopes()
        .iter()
        .map(ToString::to_string)
        .collect();
    Json(ScopeList { scopes })
}

async fn handle_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<StatusInput>>,
) -> Result<Json<StatusOutput>, ApiError> {
    let (store, strategy, _) = state.resolve(&headers, &req.service)?;
    let out = services::status(&*store, &*strategy, req.input)?;
    Ok(Json(out))
}

async fn handle_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<AddInput>>,
) -> Result<Json<AddOutput>, ApiError> {
    let (store, strategy, cancel) = state.resolve(&headers, &req.service)?;
    let out = services::add(&*store, &*strategy, &cancel, req.input).await?;
    Ok(Json(out))
}

async fn handle_edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<EditInput>>,
) -> Result<Json<EditOutput>, ApiError> {
    let (store, strategy, cancel) = state.resolve(&headers, &req.service)?;
    let out = services::edit(&*store, &*strategy, &cancel, req.input).await?;
    Ok(Json(out))
}

async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<DeleteInput>>,
) -> Result<Json<DeleteOutput>, ApiError> {
    let (store, strategy, cancel) = state.resolve(&headers, &req.service)?;
    let out = services::delete(&*store, &*strategy, &cancel, req.input).await?;
    Ok(Json(out))
}

async fn handle_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<TagInput>>,
) -> Result<Json<TagOutput>, ApiError> {
    let (store, strategy, cancel) = state.resolve(&headers, &req.service)?;
    let out = services::tag(&*store, &*strategy, &cancel, req.input).await?;
    Ok(Json(out))
}

async fn handle_untag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<UntagInput>>,
) -> Result<Json<TagOutput>, ApiError> {
    let (store, strategy, cancel) = state.resolve(&headers, &req.service)?;
    let out = services::untag(&*store, &*strategy, &cancel, req.input).await?;
    Ok(Json(out))
}

async fn handle_cancel_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<CancelTagRequest>>,
) -> Result<Json<CancelTagOutput>, ApiError> {
    let (store, strategy, _) = state.resolve(&headers, &req.service)?;
    let out = match req.input.kind {
        CancelTagKind::Add => {
            services::cancel_add_tag(&*store, &*strategy, req.input.input)?
        }
        CancelTagKind::Remove => {
            services::cancel_remove_tag(&*store, &*strategy, req.input.input)?
        }
    };
    Ok(Json(out))
}

async fn handle_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<ResetInput>>,
) -> Result<Json<ResetResult>, ApiError> {
    let (store, strategy, cancel) = state.resolve(&headers, &req.service)?;
    let out = services::reset(&*store, &*strategy, &cancel, req.input).await?;
    Ok(Json(out))
}

async fn handle_diff(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<DiffInput>>,
) -> Result<Json<DiffOutput>, ApiError> {
    let (store, strategy, cancel) = state.resolve(&headers, &req.service)?;
    let out = services::diff(&*store, &*strategy, &cancel, req.input).await?;
    Ok(Json(out))
}

async fn handle_apply(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ServiceRequest<ApplyInput>>,
) -> Result<Json<ApplyOutput>, ApiError> {
    let (store, strategy, cancel) = state.resolve(&headers, &req.service)?;
    let out = services::apply(&*store, &*strategy, &cancel, req.input).await?;
    Ok(Json(out))
}

async fn handle_drain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<DrainInput>,
) -> Result<Json<DrainOutput>, ApiError> {
    let store = state.store(&headers)?;
    let file = state.file(&headers)?;
    let cancel = state.shutdown.child_token();
    let out = blocking(move || services::drain(&file, &*store, &cancel, input)).await?;
    Ok(Json(out))
}

async fn handle_persist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<PersistInput>,
) -> Result<Json<PersistOutput>, ApiError> {
    let store = state.store(&headers)?;
    let file = state.file(&headers)?;
    let cancel = state.shutdown.child_token();
    let out = blocking(move || services::persist(&file, &*store, &cancel, input)).await?;
    Ok(Json(out))
}

/// Run file-store work (disk I/O and key derivation) on the blocking pool
async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> StageResult<T> + Send + 'static,
) -> Result<T, ApiError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StageError::Io(std::io::Error::other(e)))?
        .map_err(ApiError::from)
}
