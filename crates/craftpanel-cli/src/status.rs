use owo_colors::OwoColorize;
use std::time::Duration;
use warden::ServerState;

use crate::panel::api::StatusResponse;

const TAIL_LINES: usize = 15;

pub async fn fetch_status(port: u16) -> anyhow::Result<StatusResponse> {
	use anyhow::Context;

	let url = format!("http://127.0.0.1:{}/status", port);
	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(5))
		.build()
		.context("build http client")?;
	client
		.get(&url)
		.send()
		.await
		.with_context(|| format!("is the panel running? could not reach {}", url))?
		.error_for_status()?
		.json()
		.await
		.context("parse status response")
}

pub fn render(status: &StatusResponse) {
	let state = match status.state {
		ServerState::Online => status.state.as_str().green().bold().to_string(),
		ServerState::Booting => status.state.as_str().yellow().bold().to_string(),
		ServerState::Offline => status.state.as_str().red().bold().to_string(),
	};
	println!("{} {}", "server".bold(), state);

	if status.tunnel_up {
		if let Some(ref domain) = status.joinmc_link {
			println!("{} {}", "tunnel".bold(), domain.cyan());
		}
	} else if let Some(ref link) = status.claim_link {
		println!("{} unclaimed, visit {}", "tunnel".bold(), link.underline());
	} else if status.server_running {
		println!("{} {}", "tunnel".bold(), "waiting".dimmed());
	}

	let lines: Vec<&str> = status.logs.lines().collect();
	let start = lines.len().saturating_sub(TAIL_LINES);
	println!();
	for line in &lines[start..] {
		println!("  {}", line.dimmed());
	}
}
