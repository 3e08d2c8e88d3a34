use crate::paths;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// ── Global config (~/.config/craftpanel/config.toml) ────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub server: ServerConfig,
	#[serde(default)]
	pub http: HttpConfig,
	#[serde(default)]
	pub provision: ProvisionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	#[serde(default = "default_server_dir")]
	pub dir: PathBuf,
	#[serde(default = "default_java")]
	pub java: String,
	#[serde(default = "default_jar")]
	pub jar: String,
	#[serde(default = "default_stop_timeout")]
	pub stop_timeout_secs: u64,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			dir: default_server_dir(),
			java: default_java(),
			jar: default_jar(),
			stop_timeout_secs: default_stop_timeout(),
		}
	}
}

fn default_server_dir() -> PathBuf { PathBuf::from("minecraft_server") }
fn default_java() -> String { "java".into() }
fn default_jar() -> String { "server.jar".into() }
fn default_stop_timeout() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_port")]
	pub port: u16,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self { host: default_host(), port: default_port() }
	}
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 5000 }

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
	#[serde(default = "default_paper_api")]
	pub paper_api: String,
	#[serde(default = "default_plugin_url")]
	pub plugin_url: String,
}

impl Default for ProvisionConfig {
	fn default() -> Self {
		Self { paper_api: default_paper_api(), plugin_url: default_plugin_url() }
	}
}

fn default_paper_api() -> String {
	"https://api.papermc.io/v2/projects/paper".into()
}

fn default_plugin_url() -> String {
	"https://github.com/playit-cloud/playit-minecraft-plugin/releases/latest/download/playit-minecraft-plugin.jar".into()
}

impl GlobalConfig {
	pub fn supervisor_config(&self) -> warden::SupervisorConfig {
		let mut config = warden::SupervisorConfig::new(&self.server.dir);
		config.java = self.server.java.clone();
		config.jar = self.server.jar.clone();
		config.stop_timeout = Duration::from_secs(self.server.stop_timeout_secs);
		config
	}

	/// `SERVER_DIR` and `PLUGIN_URL` win over the file.
	pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
		if let Some(dir) = get("SERVER_DIR").filter(|v| !v.trim().is_empty()) {
			self.server.dir = PathBuf::from(dir.trim());
		}
		if let Some(url) = get("PLUGIN_URL").filter(|v| !v.trim().is_empty()) {
			self.provision.plugin_url = url.trim().to_string();
		}
	}
}

pub fn parse_global_config(content: &str) -> Result<GlobalConfig, toml::de::Error> {
	toml::from_str(content)
}

pub fn load_global_config() -> GlobalConfig {
	let path = paths::config_path();
	let mut config = GlobalConfig::default();
	if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match parse_global_config(&content) {
				Ok(c) => config = c,
				Err(e) => tracing::warn!("failed to parse {}: {}", path.display(), e),
			},
			Err(e) => tracing::warn!("failed to read {}: {}", path.display(), e),
		}
	}
	config.apply_env(|key| std::env::var(key).ok());
	config
}
