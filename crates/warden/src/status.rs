//! Pure projections over captured server output.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{ServerState, TunnelStatus};

/// Printed by the server once the world is loaded, e.g. `Done (12.3s)! For help, type "help"`.
const STARTUP_MARKER: &str = "done (";
const TUNNEL_READY_MARKER: &str = "found minecraft java tunnel";
const TUNNEL_CLAIM_MARKER: &str = "claim visit";

static JOIN_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)(?:https?://)?([a-z0-9-]+\.joinmc\.link)").expect("join domain pattern")
});

static CLAIM_URL: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)https://playit\.gg/mc/[a-z0-9]+").expect("claim url pattern")
});

/// Readiness from current facts. `offline` wins over anything in the log, so
/// lines left over from a previous run never report a dead server as online.
pub fn derive_state(dir_exists: bool, alive: bool, lines: &[String]) -> ServerState {
	if !dir_exists || !alive {
		return ServerState::Offline;
	}
	let started = lines
		.iter()
		.rev()
		.any(|line| line.to_lowercase().contains(STARTUP_MARKER));
	if started {
		ServerState::Online
	} else {
		ServerState::Booting
	}
}

/// Scans newest to oldest. The most recent ready line wins outright and drops
/// any claim link; otherwise the most recent claim link is reported.
pub fn tunnel_status(lines: &[String]) -> TunnelStatus {
	let mut claim_link = None;

	for line in lines.iter().rev() {
		let lower = line.to_lowercase();

		if lower.contains(TUNNEL_READY_MARKER) {
			if let Some(caps) = JOIN_DOMAIN.captures(line) {
				return TunnelStatus {
					ready: true,
					claim_link: None,
					join_domain: Some(caps[1].to_string()),
				};
			}
		}

		if claim_link.is_none() && lower.contains(TUNNEL_CLAIM_MARKER) {
			claim_link = CLAIM_URL.find(line).map(|m| m.as_str().to_string());
		}
	}

	TunnelStatus {
		ready: false,
		claim_link,
		join_domain: None,
	}
}
