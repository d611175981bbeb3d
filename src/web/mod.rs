use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{error, info};

use crate::{
    actions::{self, ActionOutcome, PlantAction, PlantReadout},
    error::{ActionError, ReferenceError, StoreError},
    plant::{LocationCategory, Position},
    scheduler::{CatchUpScheduler, PassReport},
    session::SessionRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub scheduler: Arc<CatchUpScheduler>,
}

pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/users/:user/heartbeat", post(heartbeat))
        .route("/api/users/:user/plants", get(list_plants).post(create_plant))
        .route("/api/users/:user/plants/:plant", delete(remove_plant))
        .route("/api/users/:user/plants/:plant/actions", post(plant_action))
        .route("/api/passes", get(recent_passes))
        .route("/api/passes/latest", get(latest_pass))
        .route("/api/events", get(stream_passes))
        .with_state(state)
}

pub async fn serve(
    state: AppState,
    config: WebServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "http surface listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Maps action failures onto HTTP statuses.
pub struct ApiError(ActionError);

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(ActionError::Store(err))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ActionError::NoSuchPlant { .. } => StatusCode::NOT_FOUND,
            ActionError::Reference(
                ReferenceError::UnknownSpecies(_) | ReferenceError::UnknownFertilizer(_),
            ) => StatusCode::BAD_REQUEST,
            ActionError::Reference(ReferenceError::Source(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ActionError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ActionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Runs blocking registry work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => Err(ApiError(ActionError::Store(StoreError::Rejected(format!(
            "worker failed: {err}"
        ))))),
    }
}

#[derive(Serialize)]
struct HeartbeatResponse {
    plants: usize,
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let registry = state.registry.clone();
    let plants = blocking(move || Ok(registry.heartbeat(&user, Utc::now())?)).await?;
    Ok(Json(HeartbeatResponse { plants }))
}

async fn list_plants(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<PlantReadout>>, ApiError> {
    let registry = state.registry.clone();
    let readouts = blocking(move || Ok(registry.readouts(&user)?)).await?;
    Ok(Json(readouts))
}

#[derive(Deserialize)]
struct CreatePlant {
    species: String,
    location: String,
    #[serde(default)]
    position: Position,
}

async fn create_plant(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(body): Json<CreatePlant>,
) -> Result<(StatusCode, Json<PlantReadout>), ApiError> {
    let registry = state.registry.clone();
    let readout = blocking(move || {
        let record = registry.plant(
            &user,
            &body.species,
            LocationCategory::parse(&body.location),
            body.position,
            Utc::now(),
        )?;
        Ok(actions::readout(&record, None))
    })
    .await?;
    Ok((StatusCode::CREATED, Json(readout)))
}

async fn remove_plant(
    State(state): State<AppState>,
    Path((user, plant)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let registry = state.registry.clone();
    let removed = blocking(move || Ok(registry.remove(&user, &plant, Utc::now())?)).await?;
    Ok(if removed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

async fn plant_action(
    State(state): State<AppState>,
    Path((user, plant)): Path<(String, String)>,
    Json(action): Json<PlantAction>,
) -> Result<Json<ActionOutcome>, ApiError> {
    let registry = state.registry.clone();
    let outcome =
        blocking(move || Ok(registry.perform(&user, &plant, &action, Utc::now())?)).await?;
    Ok(Json(outcome))
}

async fn recent_passes(State(state): State<AppState>) -> Json<Vec<PassReport>> {
    Json(state.scheduler.recent_reports())
}

async fn latest_pass(State(state): State<AppState>) -> Result<Json<PassReport>, StatusCode> {
    state
        .scheduler
        .latest_report()
        .map(Json)
        .ok_or(StatusCode::NO_CONTENT)
}

async fn stream_passes(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.scheduler.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(report) => serde_json::to_string(&report)
            .ok()
            .map(|payload| Ok(Event::default().event("pass").data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
