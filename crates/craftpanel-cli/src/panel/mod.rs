pub mod api;

use std::sync::Arc;
use warden::Supervisor;

use crate::config::GlobalConfig;

/// Serves the control panel until SIGINT/SIGTERM, then stops the server
/// process before returning.
pub async fn run(config: GlobalConfig) -> Result<(), String> {
	let supervisor = Supervisor::new(config.supervisor_config());
	tracing::info!("server directory: {}", supervisor.server_dir().display());

	let app = api::router(api::AppState {
		supervisor: Arc::clone(&supervisor),
		provision: Arc::new(config.provision.clone()),
	});

	let addr = format!("{}:{}", config.http.host, config.http.port);
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.map_err(|e| format!("failed to bind HTTP on {}: {}", addr, e))?;
	tracing::info!("control panel listening on {}", addr);

	if let Err(e) = axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
	{
		tracing::error!("HTTP server error: {}", e);
	}

	if supervisor.is_running().await {
		tracing::info!("stopping Minecraft server before exit");
	}
	supervisor.stop().await;
	Ok(())
}

async fn shutdown_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	let mut term = match signal(SignalKind::terminate()) {
		Ok(s) => Some(s),
		Err(e) => {
			tracing::warn!("cannot listen for SIGTERM: {}", e);
			None
		}
	};

	tokio::select! {
		_ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
		_ = async {
			match term.as_mut() {
				Some(s) => { s.recv().await; }
				None => std::future::pending::<()>().await,
			}
		} => tracing::info!("received SIGTERM, shutting down"),
	}
}
