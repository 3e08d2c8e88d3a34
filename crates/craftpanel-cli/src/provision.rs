//! Creates a fresh server directory: Paper jar, accepted EULA, tunnel plugin
//! and the RAM record the supervisor reads at launch.

use anyhow::Context;
use futures_util::StreamExt;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::ProvisionConfig;

pub const MIN_RAM_GB: u32 = 1;
pub const MAX_RAM_GB: u32 = 64;

const META_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const PLUGIN_FILE: &str = "playit-minecraft-plugin.jar";
const MEMINFO: &str = "/proc/meminfo";

static VERSION: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\d+\.\d+(?:\.\d+)?$").expect("version pattern"));

#[derive(Debug, Clone, serde::Deserialize)]
struct VersionBuilds {
	#[serde(default)]
	builds: Vec<u32>,
}

pub fn validate(version: &str, ram_gb: u32) -> Result<(), String> {
	if version.trim().is_empty() {
		return Err("version is required".into());
	}
	if !VERSION.is_match(version) {
		return Err(format!("enter a valid version like '1.21.5' (got '{}')", version));
	}
	if !(MIN_RAM_GB..=MAX_RAM_GB).contains(&ram_gb) {
		return Err(format!("RAM must be between {} and {} GB", MIN_RAM_GB, MAX_RAM_GB));
	}
	Ok(())
}

/// Whole GiB of `MemAvailable`, rounded down.
fn parse_mem_available_gb(meminfo: &str) -> Option<u64> {
	let kb = meminfo
		.lines()
		.find(|line| line.starts_with("MemAvailable:"))?
		.split_whitespace()
		.nth(1)?
		.parse::<u64>()
		.ok()?;
	Some(kb / (1024 * 1024))
}

/// Memory the host can hand to a new server right now, or `None` when the
/// platform does not expose it.
pub async fn available_ram_gb() -> Option<u64> {
	match tokio::fs::read_to_string(MEMINFO).await {
		Ok(content) => parse_mem_available_gb(&content),
		Err(e) => {
			tracing::debug!("cannot read {}: {}", MEMINFO, e);
			None
		}
	}
}

pub fn check_free_ram(ram_gb: u32, available_gb: Option<u64>) -> Result<(), String> {
	match available_gb {
		Some(free) if u64::from(ram_gb) > free => Err(format!(
			"Cannot allocate {} GB; only {} GB is available.",
			ram_gb, free
		)),
		_ => Ok(()),
	}
}

fn version_url(config: &ProvisionConfig, version: &str) -> String {
	format!("{}/versions/{}", config.paper_api.trim_end_matches('/'), version)
}

fn jar_url(config: &ProvisionConfig, version: &str, build: u32) -> String {
	format!(
		"{}/builds/{}/downloads/paper-{}-{}.jar",
		version_url(config, version),
		build,
		version,
		build
	)
}

fn latest_build(body: &str, version: &str) -> anyhow::Result<u32> {
	let info: VersionBuilds = serde_json::from_str(body).context("parse build info")?;
	info.builds
		.last()
		.copied()
		.ok_or_else(|| anyhow::anyhow!("no builds found for version '{}'", version))
}

fn http_client() -> anyhow::Result<reqwest::Client> {
	reqwest::Client::builder()
		.user_agent(concat!("craftpanel/", env!("CARGO_PKG_VERSION")))
		.build()
		.context("build http client")
}

async fn download_to(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
	let resp = client
		.get(url)
		.timeout(DOWNLOAD_TIMEOUT)
		.send()
		.await
		.with_context(|| format!("download {}", url))?
		.error_for_status()
		.with_context(|| format!("download {} (status)", url))?;

	let tmp = dest.with_extension("part");
	let mut file = tokio::fs::File::create(&tmp)
		.await
		.with_context(|| format!("create {}", tmp.display()))?;
	let mut body = resp.bytes_stream();
	while let Some(chunk) = body.next().await {
		let chunk = chunk.with_context(|| format!("read body of {}", url))?;
		file.write_all(&chunk).await.context("write download")?;
	}
	file.flush().await?;
	drop(file);
	tokio::fs::rename(&tmp, dest)
		.await
		.with_context(|| format!("move into place {}", dest.display()))?;
	Ok(())
}

/// Provisions `server_dir`. The directory must not exist yet; on failure it
/// is removed again so the panel does not offer a half-built server.
pub async fn create_server(
	config: &ProvisionConfig,
	server_dir: &Path,
	version: &str,
	ram_gb: u32,
) -> anyhow::Result<()> {
	validate(version, ram_gb).map_err(anyhow::Error::msg)?;
	anyhow::ensure!(
		!server_dir.exists(),
		"server directory {} already exists",
		server_dir.display()
	);
	check_free_ram(ram_gb, available_ram_gb().await).map_err(anyhow::Error::msg)?;

	let result = populate(config, server_dir, version, ram_gb).await;
	if result.is_err() {
		if let Err(e) = tokio::fs::remove_dir_all(server_dir).await {
			tracing::warn!("failed to clean up {}: {}", server_dir.display(), e);
		}
	}
	result
}

async fn populate(
	config: &ProvisionConfig,
	server_dir: &Path,
	version: &str,
	ram_gb: u32,
) -> anyhow::Result<()> {
	tokio::fs::create_dir_all(server_dir)
		.await
		.with_context(|| format!("create {}", server_dir.display()))?;
	tracing::info!("created server directory: {}", server_dir.display());

	let client = http_client()?;

	let body = client
		.get(version_url(config, version))
		.timeout(META_TIMEOUT)
		.send()
		.await
		.context("fetch build info from PaperMC API")?
		.error_for_status()
		.context("fetch build info from PaperMC API (status)")?
		.text()
		.await
		.context("read build info")?;
	let build = latest_build(&body, version)?;

	let jar_path = server_dir.join("server.jar");
	download_to(&client, &jar_url(config, version, build), &jar_path).await?;
	tracing::info!("downloaded Paper {} build {}: {}", version, build, jar_path.display());

	tokio::fs::write(server_dir.join("eula.txt"), "eula=true\n")
		.await
		.context("write eula.txt")?;
	tracing::info!("wrote eula.txt (accepted)");

	let plugins_dir = server_dir.join("plugins");
	tokio::fs::create_dir_all(&plugins_dir)
		.await
		.context("create plugins directory")?;
	let plugin_path = plugins_dir.join(PLUGIN_FILE);
	download_to(&client, &config.plugin_url, &plugin_path).await?;
	tracing::info!("downloaded playit plugin: {}", plugin_path.display());

	warden::ram::write_ram(server_dir, ram_gb).context("write ram.txt")?;
	tracing::info!("recorded RAM allocation ({} GB)", ram_gb);

	Ok(())
}
