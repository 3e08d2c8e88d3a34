use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use warden::{ServerState, Supervisor};

use crate::config::ProvisionConfig;
use crate::provision;

#[derive(Clone)]
pub struct AppState {
	pub supervisor: Arc<Supervisor>,
	pub provision: Arc<ProvisionConfig>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/status", get(status))
		.route("/start", post(start))
		.route("/stop", post(stop))
		.route("/delete", post(delete))
		.route("/command", post(command))
		.route("/create", post(create))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
	pub state: ServerState,
	pub tunnel_up: bool,
	pub claim_link: Option<String>,
	pub joinmc_link: Option<String>,
	pub logs: String,
	pub server_running: bool,
}

#[derive(Serialize)]
struct StartResponse {
	started: bool,
}

#[derive(Serialize)]
struct StopResponse {
	stopped: bool,
}

#[derive(Serialize)]
struct DeleteResponse {
	deleted: bool,
}

#[derive(Deserialize)]
struct CommandRequest {
	cmd: String,
}

#[derive(Serialize)]
struct CommandResponse {
	sent: bool,
}

#[derive(Deserialize)]
struct CreateRequest {
	version: String,
	ram: u32,
}

#[derive(Serialize)]
struct CreateResponse {
	created: bool,
	started: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
	error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
	(status, Json(ErrorResponse { error: error.into() }))
}

/// Lifecycle calls run on their own task so a dropped request cannot abandon
/// a stop halfway through.
async fn detached<T, F>(fut: F) -> Option<T>
where
	F: Future<Output = T> + Send + 'static,
	T: Send + 'static,
{
	match tokio::spawn(fut).await {
		Ok(v) => Some(v),
		Err(e) => {
			tracing::error!("lifecycle task failed: {}", e);
			None
		}
	}
}

async fn health() -> &'static str {
	"ok"
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
	let snapshot = state.supervisor.snapshot().await;
	Json(StatusResponse {
		state: snapshot.state,
		tunnel_up: snapshot.tunnel.ready,
		claim_link: snapshot.tunnel.claim_link,
		joinmc_link: snapshot.tunnel.join_domain,
		logs: snapshot.logs,
		server_running: snapshot.running,
	})
}

async fn start(State(state): State<AppState>) -> Json<StartResponse> {
	let sup = Arc::clone(&state.supervisor);
	let started = detached(async move { sup.launch().await }).await.unwrap_or(false);
	Json(StartResponse { started })
}

async fn stop(State(state): State<AppState>) -> Json<StopResponse> {
	let sup = Arc::clone(&state.supervisor);
	detached(async move { sup.stop().await }).await;
	Json(StopResponse { stopped: true })
}

async fn delete(State(state): State<AppState>) -> Json<DeleteResponse> {
	let sup = Arc::clone(&state.supervisor);
	let deleted = detached(async move { sup.delete().await }).await.unwrap_or(false);
	Json(DeleteResponse { deleted })
}

async fn command(
	State(state): State<AppState>,
	body: Result<Json<CommandRequest>, JsonRejection>,
) -> Json<CommandResponse> {
	let cmd = match body {
		Ok(Json(req)) => req.cmd,
		Err(e) => {
			tracing::warn!("rejected command request: {}", e);
			return Json(CommandResponse { sent: false });
		}
	};
	let cmd = cmd.trim();
	if cmd.is_empty() {
		return Json(CommandResponse { sent: false });
	}
	Json(CommandResponse {
		sent: state.supervisor.send(cmd).await,
	})
}

async fn create(
	State(state): State<AppState>,
	body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateResponse>), ApiError> {
	let Json(req) = body.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
	let version = req.version.trim().to_string();
	provision::validate(&version, req.ram).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

	if state.supervisor.server_exists() {
		return Err(api_error(StatusCode::CONFLICT, "server already exists"));
	}
	provision::check_free_ram(req.ram, provision::available_ram_gb().await)
		.map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

	let sup = Arc::clone(&state.supervisor);
	let provision_config = Arc::clone(&state.provision);
	let ram = req.ram;
	let created = detached(async move {
		provision::create_server(&provision_config, sup.server_dir(), &version, ram).await
	})
	.await;

	match created {
		Some(Ok(())) => {
			let sup = Arc::clone(&state.supervisor);
			let started = detached(async move { sup.launch().await }).await.unwrap_or(false);
			Ok((StatusCode::CREATED, Json(CreateResponse { created: true, started })))
		}
		Some(Err(e)) => {
			tracing::error!("failed to create server: {:#}", e);
			Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))
		}
		None => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "server creation was interrupted")),
	}
}
