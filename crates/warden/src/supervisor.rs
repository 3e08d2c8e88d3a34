use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::output::{self, LogBuffer, MAX_LOG_LINES};
use crate::ram;
use crate::status;
use crate::types::*;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	pub server_dir: PathBuf,
	pub java: String,
	pub jar: String,
	pub stop_timeout: Duration,
	/// Upper bound for one console write, for servers that stop reading stdin.
	pub command_timeout: Duration,
	pub log_capacity: usize,
}

impl SupervisorConfig {
	pub fn new(server_dir: impl Into<PathBuf>) -> Self {
		Self {
			server_dir: server_dir.into(),
			java: "java".to_string(),
			jar: "server.jar".to_string(),
			stop_timeout: Duration::from_secs(30),
			command_timeout: Duration::from_secs(5),
			log_capacity: MAX_LOG_LINES,
		}
	}
}

/// Program and arguments for one launch, resolved from the RAM record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
	pub program: String,
	pub args: Vec<String>,
	pub ram_gb: u32,
}

impl LaunchPlan {
	pub fn resolve(config: &SupervisorConfig) -> Self {
		Self::with_ram(config, ram::read_ram(&config.server_dir))
	}

	pub fn with_ram(config: &SupervisorConfig, ram_gb: u32) -> Self {
		let mut args: Vec<String> = ram::heap_flags(ram_gb).into();
		args.extend(["-jar".to_string(), config.jar.clone(), "nogui".to_string()]);
		Self {
			program: config.java.clone(),
			args,
			ram_gb,
		}
	}
}

struct ServerProcess {
	child: Child,
	stdin: SharedStdin,
	pid: Option<u32>,
	pump: JoinHandle<()>,
}

impl ServerProcess {
	fn is_alive(&mut self) -> bool {
		match self.child.try_wait() {
			Ok(None) => true,
			Ok(Some(_)) => false,
			Err(e) => {
				tracing::debug!("liveness probe failed: {}", e);
				false
			}
		}
	}

}

/// Writes `text` plus a newline, giving up after `limit`. The pipe has its own
/// lock, so a server that stopped reading never stalls liveness probes or kills.
async fn write_line(stdin: &SharedStdin, text: &str, limit: Duration) -> std::io::Result<()> {
	let write = async {
		let mut pipe = stdin.lock().await;
		let pipe = pipe.as_mut().ok_or_else(|| {
			std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin is closed")
		})?;
		pipe.write_all(format!("{}\n", text).as_bytes()).await?;
		pipe.flush().await
	};
	match tokio::time::timeout(limit, write).await {
		Ok(result) => result,
		Err(_) => Err(std::io::Error::new(
			std::io::ErrorKind::TimedOut,
			format!("stdin not drained within {}s", limit.as_secs_f32()),
		)),
	}
}

/// Owns the one server process and its captured output.
///
/// `process` guards every read and write of the handle and is never held
/// across a sleep or a stdin write. `lifecycle` serializes launch, stop and delete.
pub struct Supervisor {
	config: SupervisorConfig,
	process: Mutex<Option<ServerProcess>>,
	lifecycle: Mutex<()>,
	logs: LogBuffer,
}

impl Supervisor {
	pub fn new(config: SupervisorConfig) -> Arc<Self> {
		let logs = LogBuffer::new(config.log_capacity);
		Arc::new(Self {
			config,
			process: Mutex::new(None),
			lifecycle: Mutex::new(()),
			logs,
		})
	}

	pub fn server_dir(&self) -> &Path {
		&self.config.server_dir
	}

	pub fn server_exists(&self) -> bool {
		self.config.server_dir.is_dir()
	}

	pub async fn is_running(&self) -> bool {
		let mut slot = self.process.lock().await;
		slot.as_mut().is_some_and(|p| p.is_alive())
	}

	pub async fn pid(&self) -> Option<u32> {
		let mut slot = self.process.lock().await;
		slot.as_mut().and_then(|p| if p.is_alive() { p.pid } else { None })
	}

	/// Starts the server, stopping a running one first. Returns `false` when
	/// the spawn failed; the supervisor is then left with no process.
	pub async fn launch(&self) -> bool {
		let _guard = self.lifecycle.lock().await;

		if self.is_running().await {
			tracing::info!("server is already running, stopping it first");
			self.stop_locked(self.config.stop_timeout).await;
		} else {
			self.clear_handle().await;
		}

		let plan = LaunchPlan::resolve(&self.config);
		self.logs.clear().await;

		let mut cmd = Command::new(&plan.program);
		cmd.args(&plan.args)
			.current_dir(&self.config.server_dir)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0);

		let mut child = match cmd.spawn() {
			Ok(c) => c,
			Err(e) => {
				tracing::error!(
					"failed to launch server ({} in {}): {}",
					plan.program,
					self.config.server_dir.display(),
					e
				);
				*self.process.lock().await = None;
				return false;
			}
		};

		let pid = child.id();
		let stdin = Arc::new(Mutex::new(child.stdin.take()));
		let stdout = child.stdout.take();
		let stderr = child.stderr.take();
		let logs = self.logs.clone();
		let pump = tokio::spawn(async move {
			output::pump_output(stdout, stderr, logs).await;
		});

		*self.process.lock().await = Some(ServerProcess {
			child,
			stdin,
			pid,
			pump,
		});

		match pid {
			Some(pid) => tracing::info!("launched server with {} GB RAM (pid {})", plan.ram_gb, pid),
			None => tracing::info!("launched server with {} GB RAM", plan.ram_gb),
		}
		true
	}

	/// Graceful stop with the configured timeout.
	pub async fn stop(&self) {
		self.stop_with_timeout(self.config.stop_timeout).await;
	}

	/// Sends `stop` on stdin and waits up to `timeout`; on any failure kills
	/// the process group and waits up to `timeout` again. The handle is
	/// cleared whatever happens.
	pub async fn stop_with_timeout(&self, timeout: Duration) {
		let _guard = self.lifecycle.lock().await;
		self.stop_locked(timeout).await;
	}

	async fn stop_locked(&self, timeout: Duration) {
		if !self.is_running().await {
			tracing::info!("no server process is running");
			self.clear_handle().await;
			return;
		}

		match self.graceful_stop(timeout).await {
			Ok(()) => tracing::info!("server stopped gracefully"),
			Err(reason) => {
				tracing::warn!("graceful stop failed ({}); killing process", reason);
				match self.force_stop(timeout).await {
					Ok(()) => tracing::info!("server killed"),
					Err(e) => tracing::error!("error killing server process: {}", e),
				}
			}
		}

		self.clear_handle().await;
	}

	async fn graceful_stop(&self, timeout: Duration) -> Result<(), String> {
		let deadline = Instant::now() + timeout;
		let stdin = {
			let slot = self.process.lock().await;
			let proc = slot.as_ref().ok_or("process handle vanished")?;
			Arc::clone(&proc.stdin)
		};
		write_line(&stdin, "stop", timeout)
			.await
			.map_err(|e| format!("write to stdin failed: {}", e))?;
		self.wait_for_exit(deadline.saturating_duration_since(Instant::now())).await
	}

	async fn force_stop(&self, timeout: Duration) -> Result<(), String> {
		{
			let mut slot = self.process.lock().await;
			let Some(proc) = slot.as_mut() else {
				return Ok(());
			};
			let group_killed = proc.pid.is_some_and(kill_process_group);
			if !group_killed {
				proc.child
					.start_kill()
					.map_err(|e| format!("kill failed: {}", e))?;
			}
		}
		self.wait_for_exit(timeout).await
	}

	async fn wait_for_exit(&self, timeout: Duration) -> Result<(), String> {
		let deadline = Instant::now() + timeout;
		loop {
			{
				let mut slot = self.process.lock().await;
				let Some(proc) = slot.as_mut() else {
					return Ok(());
				};
				match proc.child.try_wait() {
					Ok(Some(status)) => {
						tracing::debug!("server exited with {}", status);
						return Ok(());
					}
					Ok(None) => {}
					Err(e) => return Err(format!("wait failed: {}", e)),
				}
			}
			if Instant::now() >= deadline {
				return Err(format!("no exit within {}s", timeout.as_secs_f32()));
			}
			tokio::time::sleep(EXIT_POLL_INTERVAL).await;
		}
	}

	/// Drops the handle and gives its pump a moment to flush the last lines
	/// of the exited process.
	async fn clear_handle(&self) {
		let finished = self.process.lock().await.take();
		if let Some(proc) = finished {
			drop(proc.stdin);
			if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, proc.pump).await.is_err() {
				tracing::debug!("output pump still draining after exit");
			}
		}
	}

	/// Writes `text` plus a newline to the server console. Fails closed when
	/// nothing is running.
	pub async fn send(&self, text: &str) -> bool {
		let stdin = {
			let mut slot = self.process.lock().await;
			let Some(proc) = slot.as_mut() else {
				tracing::warn!("attempted to send command, but server is not running");
				return false;
			};
			if !proc.is_alive() {
				tracing::warn!("attempted to send command, but server has exited");
				return false;
			}
			Arc::clone(&proc.stdin)
		};
		match write_line(&stdin, text, self.config.command_timeout).await {
			Ok(()) => {
				tracing::info!("sent command to server: {}", text);
				true
			}
			Err(e) => {
				tracing::error!("failed to send command '{}': {}", text, e);
				false
			}
		}
	}

	/// Stops the server if needed, then removes the whole server directory.
	pub async fn delete(&self) -> bool {
		let _guard = self.lifecycle.lock().await;
		if self.is_running().await {
			self.stop_locked(self.config.stop_timeout).await;
		} else {
			self.clear_handle().await;
		}

		let dir = &self.config.server_dir;
		if !dir.is_dir() {
			return true;
		}
		match tokio::fs::remove_dir_all(dir).await {
			Ok(()) => {
				tracing::info!("deleted server directory: {}", dir.display());
				true
			}
			Err(e) => {
				tracing::error!("failed to delete server directory '{}': {}", dir.display(), e);
				false
			}
		}
	}

	pub async fn log_lines(&self) -> Vec<String> {
		self.logs.snapshot().await
	}

	pub async fn log_text(&self) -> String {
		self.logs.text().await
	}

	pub async fn state(&self) -> ServerState {
		let alive = self.is_running().await;
		let lines = self.logs.snapshot().await;
		status::derive_state(self.server_exists(), alive, &lines)
	}

	pub async fn tunnel_status(&self) -> TunnelStatus {
		status::tunnel_status(&self.logs.snapshot().await)
	}

	pub async fn snapshot(&self) -> PanelStatus {
		let running = self.is_running().await;
		let lines = self.logs.snapshot().await;
		PanelStatus {
			state: status::derive_state(self.server_exists(), running, &lines),
			tunnel: status::tunnel_status(&lines),
			logs: output::render_text(&lines),
			running,
		}
	}
}

/// SIGKILL to the process group the server was spawned into. Returns whether
/// the signal was delivered.
fn kill_process_group(pid: u32) -> bool {
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;
	match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
		Ok(()) => true,
		Err(e) => {
			tracing::debug!("killpg {} failed: {}", pid, e);
			false
		}
	}
}
