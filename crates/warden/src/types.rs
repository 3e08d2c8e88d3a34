use serde::{Deserialize, Serialize};
use std::fmt;

/// Readiness of the supervised server, recomputed from current facts on every query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
	Offline,
	Booting,
	Online,
}

impl ServerState {
	pub fn as_str(&self) -> &'static str {
		match self {
			ServerState::Offline => "offline",
			ServerState::Booting => "booting",
			ServerState::Online => "online",
		}
	}
}

impl fmt::Display for ServerState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Tunnel connectivity scraped from the server log.
///
/// `join_domain` is always a bare host (no scheme) and is only set when `ready`.
/// `claim_link` is only set while the tunnel is not ready.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelStatus {
	pub ready: bool,
	pub claim_link: Option<String>,
	pub join_domain: Option<String>,
}

/// Everything a control panel polls for, computed from a single log snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PanelStatus {
	pub state: ServerState,
	pub tunnel: TunnelStatus,
	pub logs: String,
	pub running: bool,
}
