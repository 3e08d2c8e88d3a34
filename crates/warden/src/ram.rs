use std::path::{Path, PathBuf};

pub const RAM_FILE: &str = "ram.txt";
pub const DEFAULT_RAM_GB: u32 = 2;

pub fn ram_file(server_dir: &Path) -> PathBuf {
	server_dir.join(RAM_FILE)
}

/// Interprets the contents of a RAM record.
///
/// Returns `Err` with a reason when the value is unusable so the caller can
/// log it; callers fall back to [`DEFAULT_RAM_GB`].
pub fn parse_ram(content: &str) -> Result<u32, String> {
	let trimmed = content.trim();
	let value: i64 = trimmed
		.parse()
		.map_err(|_| format!("non-integer RAM value {:?}", trimmed))?;
	if value < 1 {
		return Err(format!("invalid RAM value {}", value));
	}
	u32::try_from(value).map_err(|_| format!("RAM value {} out of range", value))
}

/// Reads the RAM allocation for a launch. Never fails: a missing record is
/// silently the default, a bad one is the default plus a warning.
pub fn read_ram(server_dir: &Path) -> u32 {
	let path = ram_file(server_dir);
	let content = match std::fs::read_to_string(&path) {
		Ok(c) => c,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return DEFAULT_RAM_GB,
		Err(e) => {
			tracing::warn!("failed to read {}: {}; defaulting to {} GB", path.display(), e, DEFAULT_RAM_GB);
			return DEFAULT_RAM_GB;
		}
	};
	match parse_ram(&content) {
		Ok(ram) => ram,
		Err(reason) => {
			tracing::warn!("{} in {}; defaulting to {} GB", reason, path.display(), DEFAULT_RAM_GB);
			DEFAULT_RAM_GB
		}
	}
}

pub fn write_ram(server_dir: &Path, ram_gb: u32) -> std::io::Result<()> {
	std::fs::write(ram_file(server_dir), ram_gb.to_string())
}

/// JVM heap flags for `ram_gb` gigabytes: initial and maximum heap are equal.
pub fn heap_flags(ram_gb: u32) -> [String; 2] {
	[format!("-Xmx{}G", ram_gb), format!("-Xms{}G", ram_gb)]
}
