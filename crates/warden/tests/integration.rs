use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use warden::ram;
use warden::{ServerState, Supervisor, SupervisorConfig, NO_OUTPUT_PLACEHOLDER};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

// Stands in for `java`: prints its arguments and boot.txt, then acts as a
// console that exits on "stop" unless ignore-stop exists. With a `deaf` file
// it never reads stdin at all.
const FAKE_SERVER: &str = r#"#!/bin/sh
[ -f quiet ] || echo "args: $*"
[ -f boot.txt ] && cat boot.txt
if [ -f deaf ]; then
	echo "up"
	exec sleep 1000
fi
while IFS= read -r line; do
	echo "> $line"
	if [ "$line" = "stop" ]; then
		[ -f ignore-stop ] && continue
		echo "Stopping server"
		exit 0
	fi
done
"#;

fn temp_dir(name: &str) -> PathBuf {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	let dir = std::env::temp_dir().join(format!("warden-test-{}-{}-{}", std::process::id(), n, name));
	let _ = std::fs::remove_dir_all(&dir);
	std::fs::create_dir_all(&dir).unwrap();
	dir
}

// Written once before any test spawns, so no exec races an open write handle.
fn fake_java() -> &'static Path {
	static SCRIPT: OnceLock<PathBuf> = OnceLock::new();
	SCRIPT.get_or_init(|| {
		let dir = temp_dir("bin");
		let path = dir.join("fake-java");
		std::fs::write(&path, FAKE_SERVER).unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
		path
	})
}

fn test_supervisor(name: &str) -> (Arc<Supervisor>, PathBuf) {
	let java = fake_java().to_string_lossy().to_string();
	let dir = temp_dir(name);
	let mut config = SupervisorConfig::new(&dir);
	config.java = java;
	config.stop_timeout = Duration::from_secs(5);
	(Supervisor::new(config), dir)
}

async fn wait_for_line(sup: &Supervisor, needle: &str) -> bool {
	for _ in 0..100 {
		if sup.log_lines().await.iter().any(|l| l.contains(needle)) {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	false
}

async fn wait_for_state(sup: &Supervisor, state: ServerState) -> bool {
	for _ in 0..100 {
		if sup.state().await == state {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	false
}

// --- Lifecycle ---

#[tokio::test]
async fn launch_boot_and_stop() {
	let (sup, dir) = test_supervisor("boot");
	std::fs::write(dir.join("boot.txt"), "Starting...\nLoading world...\n").unwrap();

	assert!(sup.launch().await);
	assert!(sup.is_running().await);
	assert!(sup.pid().await.is_some());
	assert!(wait_for_line(&sup, "Loading world...").await);
	assert_eq!(sup.state().await, ServerState::Booting);

	assert!(sup.send("say [Server] Done (12.3s)!").await);
	assert!(wait_for_state(&sup, ServerState::Online).await);

	sup.stop().await;
	assert!(!sup.is_running().await);
	assert_eq!(sup.pid().await, None);
	assert_eq!(sup.state().await, ServerState::Offline);
	assert!(sup.log_lines().await.iter().any(|l| l == "Stopping server"));

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn stop_when_idle_is_noop() {
	let (sup, dir) = test_supervisor("idle-stop");
	sup.stop().await;
	sup.stop().await;
	assert!(!sup.is_running().await);
	assert_eq!(sup.log_text().await, NO_OUTPUT_PLACEHOLDER);
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn stop_escalates_to_kill() {
	let (sup, dir) = test_supervisor("escalate");
	std::fs::write(dir.join("ignore-stop"), "").unwrap();

	assert!(sup.launch().await);
	assert!(wait_for_line(&sup, "args:").await);

	let started = std::time::Instant::now();
	sup.stop_with_timeout(Duration::from_millis(500)).await;
	assert!(!sup.is_running().await);
	assert!(started.elapsed() < Duration::from_secs(5));
	assert!(!sup.log_lines().await.iter().any(|l| l == "Stopping server"));

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn relaunch_replaces_process_and_clears_logs() {
	let (sup, dir) = test_supervisor("relaunch");
	assert!(sup.launch().await);
	assert!(wait_for_line(&sup, "args:").await);
	let first_pid = sup.pid().await;

	std::fs::write(dir.join("quiet"), "").unwrap();
	assert!(sup.launch().await);
	assert!(sup.is_running().await);
	assert_ne!(sup.pid().await, first_pid);
	assert_eq!(sup.log_text().await, NO_OUTPUT_PLACEHOLDER);

	sup.stop().await;
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn spawn_failure_leaves_no_process() {
	let _ = fake_java();
	let dir = temp_dir("spawn-fail");
	let mut config = SupervisorConfig::new(&dir);
	config.java = dir.join("missing-java").to_string_lossy().to_string();
	let sup = Supervisor::new(config);

	assert!(!sup.launch().await);
	assert!(!sup.is_running().await);
	assert_eq!(sup.state().await, ServerState::Offline);
	assert!(!sup.send("list").await);

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn spawn_failure_when_server_dir_missing() {
	let (sup, dir) = test_supervisor("no-dir");
	std::fs::remove_dir_all(&dir).unwrap();
	assert!(!sup.launch().await);
	assert!(!sup.is_running().await);
}

// --- RAM record ---

#[tokio::test]
async fn ram_record_sets_heap_flags() {
	let (sup, dir) = test_supervisor("ram-8");
	ram::write_ram(&dir, 8).unwrap();

	assert!(sup.launch().await);
	assert!(wait_for_line(&sup, "args:").await);
	let lines = sup.log_lines().await;
	let args = lines.iter().find(|l| l.starts_with("args:")).unwrap();
	assert_eq!(args, "args: -Xmx8G -Xms8G -jar server.jar nogui");

	sup.stop().await;
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn invalid_ram_record_defaults() {
	for (i, bad) in ["0", "abc"].iter().enumerate() {
		let (sup, dir) = test_supervisor(&format!("ram-bad-{}", i));
		std::fs::write(ram::ram_file(&dir), bad).unwrap();

		assert!(sup.launch().await);
		assert!(wait_for_line(&sup, "args:").await);
		let lines = sup.log_lines().await;
		assert!(lines.iter().any(|l| l.starts_with("args: -Xmx2G -Xms2G")), "lines: {:?}", lines);

		sup.stop().await;
		let _ = std::fs::remove_dir_all(&dir);
	}
}

// --- Command channel ---

#[tokio::test]
async fn send_reaches_stdin() {
	let (sup, dir) = test_supervisor("send");
	assert!(!sup.send("list").await);

	assert!(sup.launch().await);
	assert!(sup.send("list").await);
	assert!(wait_for_line(&sup, "> list").await);

	sup.stop().await;
	assert!(!sup.send("list").await);
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn stop_while_command_write_is_stuck() {
	let (sup, dir) = test_supervisor("deaf-stop");
	std::fs::write(dir.join("deaf"), "").unwrap();
	assert!(sup.launch().await);
	assert!(wait_for_line(&sup, "up").await);

	// Far more than a pipe buffer holds; nobody on the other end reads it.
	let sender = {
		let sup = Arc::clone(&sup);
		tokio::spawn(async move { sup.send(&"x".repeat(200_000)).await })
	};
	tokio::time::sleep(Duration::from_millis(200)).await;

	let state = tokio::time::timeout(Duration::from_secs(3), sup.state()).await;
	assert_eq!(state.ok(), Some(ServerState::Booting));
	let snapshot = tokio::time::timeout(Duration::from_secs(3), sup.snapshot()).await;
	assert!(snapshot.is_ok_and(|s| s.running));

	let stopped = tokio::time::timeout(
		Duration::from_secs(5),
		sup.stop_with_timeout(Duration::from_millis(500)),
	)
	.await;
	assert!(stopped.is_ok(), "stop waited on the stuck writer");
	assert!(!sup.is_running().await);

	let sent = tokio::time::timeout(Duration::from_secs(5), sender).await;
	assert_eq!(sent.ok().and_then(|r| r.ok()), Some(false));

	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn send_gives_up_on_full_pipe() {
	let java = fake_java().to_string_lossy().to_string();
	let dir = temp_dir("deaf-send");
	std::fs::write(dir.join("deaf"), "").unwrap();
	let mut config = SupervisorConfig::new(&dir);
	config.java = java;
	config.command_timeout = Duration::from_millis(300);
	let sup = Supervisor::new(config);

	assert!(sup.launch().await);
	assert!(wait_for_line(&sup, "up").await);

	let started = std::time::Instant::now();
	assert!(!sup.send(&"x".repeat(200_000)).await);
	assert!(started.elapsed() < Duration::from_secs(3));
	assert!(sup.is_running().await);

	// The pipe is still full, so the graceful "stop" cannot be written either.
	let started = std::time::Instant::now();
	sup.stop_with_timeout(Duration::from_millis(500)).await;
	assert!(started.elapsed() < Duration::from_secs(3));
	assert!(!sup.is_running().await);

	let _ = std::fs::remove_dir_all(&dir);
}

// --- Tunnel scraping ---

#[tokio::test]
async fn tunnel_claim_then_ready() {
	let (sup, dir) = test_supervisor("tunnel");
	std::fs::write(
		dir.join("boot.txt"),
		"[playit] failed to exchange, to claim visit: https://playit.gg/mc/AB12\n",
	)
	.unwrap();

	assert!(sup.launch().await);
	assert!(wait_for_line(&sup, "claim visit").await);
	let tunnel = sup.tunnel_status().await;
	assert!(!tunnel.ready);
	assert_eq!(tunnel.claim_link.as_deref(), Some("https://playit.gg/mc/AB12"));
	assert_eq!(tunnel.join_domain, None);

	assert!(sup.send("found minecraft java tunnel: https://foo.joinmc.link").await);
	assert!(wait_for_line(&sup, "joinmc.link").await);
	let tunnel = sup.tunnel_status().await;
	assert!(tunnel.ready);
	assert_eq!(tunnel.claim_link, None);
	assert_eq!(tunnel.join_domain.as_deref(), Some("foo.joinmc.link"));

	let snapshot = sup.snapshot().await;
	assert!(snapshot.running);
	assert_eq!(snapshot.tunnel, tunnel);
	assert!(snapshot.logs.contains("claim visit"));

	sup.stop().await;
	let _ = std::fs::remove_dir_all(&dir);
}

// --- Delete ---

#[tokio::test]
async fn delete_stops_and_removes_dir() {
	let (sup, dir) = test_supervisor("delete");
	std::fs::write(dir.join("boot.txt"), "Done (1.0s)!\n").unwrap();
	assert!(sup.launch().await);
	assert!(wait_for_state(&sup, ServerState::Online).await);

	assert!(sup.delete().await);
	assert!(!dir.exists());
	assert!(!sup.is_running().await);
	assert!(!sup.server_exists());
	assert_eq!(sup.state().await, ServerState::Offline);

	// Nothing left to remove.
	assert!(sup.delete().await);
}
