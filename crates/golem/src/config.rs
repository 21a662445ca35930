use golem_supervisor::{LaunchSpec, SupervisorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "golem-config.json";
pub const SERVER_JAR: &str = "server.jar";

// ── golem-config.json ────────────────────────────────────────────────────────

/// Keys the server updater reads (`serverType`, `buildNumber`, ...) may sit
/// in the same file; unknown keys are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	#[serde(default = "default_java_path")]
	pub java_path: String,
	#[serde(default = "default_min_ram")]
	pub min_ram: String,
	#[serde(default = "default_max_ram")]
	pub max_ram: String,
	#[serde(default = "default_server_path")]
	pub server_path: PathBuf,
	#[serde(default = "default_true")]
	pub accept_eula: bool,
	#[serde(default = "default_grace_period")]
	pub grace_period_secs: u64,
	#[serde(default = "default_restart_delay")]
	pub restart_delay_secs: u64,
	#[serde(default = "default_watch_interval")]
	pub watch_interval_secs: u64,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			java_path: default_java_path(),
			min_ram: default_min_ram(),
			max_ram: default_max_ram(),
			server_path: default_server_path(),
			accept_eula: true,
			grace_period_secs: default_grace_period(),
			restart_delay_secs: default_restart_delay(),
			watch_interval_secs: default_watch_interval(),
		}
	}
}

fn default_java_path() -> String { "java".into() }
fn default_min_ram() -> String { "1G".into() }
fn default_max_ram() -> String { "2G".into() }
fn default_server_path() -> PathBuf { PathBuf::from("server") }
fn default_true() -> bool { true }
fn default_grace_period() -> u64 { 30 }
fn default_restart_delay() -> u64 { 3 }
fn default_watch_interval() -> u64 { 2 }

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse config file {path}: {message}")]
	Parse { path: PathBuf, message: String },
	#[error("invalid config: {0}")]
	Invalid(String),
}

impl Config {
	/// JSON unless the file name ends in `.toml`.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::parse(&content, is_toml(path)).map_err(|message| ConfigError::Parse {
			path: path.to_path_buf(),
			message,
		})?;
		config.validate()?;
		Ok(config)
	}

	fn parse(content: &str, toml: bool) -> Result<Self, String> {
		if toml {
			toml::from_str(content).map_err(|e| e.to_string())
		} else {
			serde_json::from_str(content).map_err(|e| e.to_string())
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.java_path.trim().is_empty() {
			return Err(ConfigError::Invalid("javaPath is empty".into()));
		}
		for (key, value) in [("minRam", &self.min_ram), ("maxRam", &self.max_ram)] {
			if !is_heap_size(value) {
				return Err(ConfigError::Invalid(format!(
					"{} must look like 512M or 4G, got {:?}",
					key, value
				)));
			}
		}
		Ok(())
	}

	pub fn artifact_path(&self) -> PathBuf {
		self.server_path.join(SERVER_JAR)
	}

	pub fn plugins_dir(&self) -> PathBuf {
		self.server_path.join("plugins")
	}

	pub fn launch_spec(&self) -> LaunchSpec {
		let mut spec = LaunchSpec::java(
			&self.java_path,
			&self.server_path,
			&self.min_ram,
			&self.max_ram,
			SERVER_JAR,
		);
		spec.accept_eula = self.accept_eula;
		spec
	}

	pub fn supervisor_config(&self) -> SupervisorConfig {
		SupervisorConfig {
			grace_period: Duration::from_secs(self.grace_period_secs),
			settle_delay: Duration::from_secs(self.restart_delay_secs),
			..SupervisorConfig::default()
		}
	}

	pub fn watch_interval(&self) -> Duration {
		Duration::from_secs(self.watch_interval_secs.max(1))
	}
}

fn is_toml(path: &Path) -> bool {
	path.extension().and_then(|e| e.to_str()) == Some("toml")
}

fn is_heap_size(value: &str) -> bool {
	let Some(digits) = value.strip_suffix(|c: char| matches!(c, 'k' | 'K' | 'm' | 'M' | 'g' | 'G')) else {
		return !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit());
	};
	!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_json_config() {
		let json = r#"{
			"serverType": "paper",
			"serverVersion": "1.21.4",
			"buildNumber": 212,
			"javaPath": "/usr/lib/jvm/java-21/bin/java",
			"minRam": "2G",
			"maxRam": "6G",
			"serverPath": "/srv/paper",
			"allowExperimentalBuilds": false
		}"#;
		let config = Config::parse(json, false).unwrap();
		assert_eq!(config.java_path, "/usr/lib/jvm/java-21/bin/java");
		assert_eq!(config.max_ram, "6G");
		assert_eq!(config.artifact_path(), PathBuf::from("/srv/paper/server.jar"));
		assert_eq!(config.grace_period_secs, 30);
		assert_eq!(config.restart_delay_secs, 3);
		assert!(config.accept_eula);
	}

	#[test]
	fn parses_toml() {
		let toml = r#"
			serverType = "purpur"
			serverPath = "mc"
			gracePeriodSecs = 10
		"#;
		let config = Config::parse(toml, true).unwrap();
		assert_eq!(config.java_path, "java");
		assert_eq!(config.plugins_dir(), PathBuf::from("mc/plugins"));
		assert_eq!(config.supervisor_config().grace_period, Duration::from_secs(10));
	}

	#[test]
	fn empty_object_uses_defaults() {
		let config = Config::parse("{}", false).unwrap();
		assert_eq!(config.java_path, "java");
		assert_eq!(config.min_ram, "1G");
		assert_eq!(config.max_ram, "2G");
		assert_eq!(config.watch_interval(), Duration::from_secs(2));
	}

	#[test]
	fn launch_spec_from_config() {
		let config = Config::default();
		let spec = config.launch_spec();
		assert_eq!(spec.args, ["-Xms1G", "-Xmx2G", "-jar", "server.jar", "nogui"]);
		assert_eq!(spec.working_dir, PathBuf::from("server"));
	}

	#[test]
	fn heap_sizes_validated() {
		assert!(is_heap_size("512M"));
		assert!(is_heap_size("4g"));
		assert!(is_heap_size("1048576"));
		assert!(!is_heap_size("G"));
		assert!(!is_heap_size("lots"));
		let config = Config { max_ram: "4 GB".into(), ..Config::default() };
		assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn missing_file_is_read_error() {
		let err = Config::load(Path::new("/nonexistent/golem-config.json")).unwrap_err();
		assert!(matches!(err, ConfigError::Read { .. }));
	}
}
