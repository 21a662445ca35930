use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Everything needed to spawn one server instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
	pub program: PathBuf,
	pub args: Vec<String>,
	pub working_dir: PathBuf,
	/// Checked for existence before each spawn when set.
	pub artifact: Option<PathBuf>,
	/// Write `eula.txt` into the working directory before each spawn.
	pub accept_eula: bool,
}

impl LaunchSpec {
	/// `java -Xms<min> -Xmx<max> -jar <artifact> nogui`, run from `server_dir`.
	pub fn java(
		java_path: impl Into<PathBuf>,
		server_dir: impl Into<PathBuf>,
		min_heap: &str,
		max_heap: &str,
		artifact_name: &str,
	) -> Self {
		let server_dir = server_dir.into();
		Self {
			program: java_path.into(),
			args: vec![
				format!("-Xms{}", min_heap),
				format!("-Xmx{}", max_heap),
				"-jar".to_string(),
				artifact_name.to_string(),
				"nogui".to_string(),
			],
			artifact: Some(server_dir.join(artifact_name)),
			working_dir: server_dir,
			accept_eula: true,
		}
	}

	/// An arbitrary program with no artifact or licence requirements.
	pub fn command(
		program: impl Into<PathBuf>,
		args: impl IntoIterator<Item = impl Into<String>>,
		working_dir: impl Into<PathBuf>,
	) -> Self {
		Self {
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
			working_dir: working_dir.into(),
			artifact: None,
			accept_eula: false,
		}
	}

	pub(crate) fn to_command(&self) -> Command {
		let mut cmd = Command::new(&self.program);
		cmd.args(&self.args)
			.current_dir(&self.working_dir)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0);
		cmd
	}
}

pub const EULA_FILE: &str = "eula.txt";

/// Write the licence marker the server refuses to boot without.
pub fn accept_eula(server_dir: &Path) -> std::io::Result<()> {
	std::fs::write(server_dir.join(EULA_FILE), "eula=true")?;
	tracing::info!("by using this configuration, you are indicating your agreement to Minecraft's EULA");
	tracing::info!("see https://www.minecraft.net/en-us/eula for more information");
	Ok(())
}

/// Timings for the supervisor's state machine.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	/// How long the server gets to exit after the stop directive.
	pub grace_period: Duration,
	/// Pause between stop and start during a restart.
	pub settle_delay: Duration,
	/// How long to wait for the exit signal after SIGKILL.
	pub kill_confirm: Duration,
	/// How long relays keep draining a pipe once the process has exited.
	pub drain_window: Duration,
	/// How long an operator line may take to reach the server's stdin.
	pub input_timeout: Duration,
	pub stop_directive: String,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			grace_period: Duration::from_secs(30),
			settle_delay: Duration::from_secs(3),
			kill_confirm: Duration::from_secs(5),
			drain_window: Duration::from_millis(500),
			input_timeout: Duration::from_secs(5),
			stop_directive: "stop".to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn java_launch_arguments() {
		let spec = LaunchSpec::java("/usr/bin/java", "/srv/mc", "1G", "4G", "server.jar");
		assert_eq!(spec.args, ["-Xms1G", "-Xmx4G", "-jar", "server.jar", "nogui"]);
		assert_eq!(spec.working_dir, PathBuf::from("/srv/mc"));
		assert_eq!(spec.artifact, Some(PathBuf::from("/srv/mc/server.jar")));
		assert!(spec.accept_eula);
	}

	#[test]
	fn plain_command_has_no_artifact() {
		let spec = LaunchSpec::command("sh", ["-c", "true"], "/tmp");
		assert_eq!(spec.args, ["-c", "true"]);
		assert!(spec.artifact.is_none());
		assert!(!spec.accept_eula);
	}

	#[test]
	fn eula_marker_written() {
		let dir = std::env::temp_dir().join(format!("golem-eula-{}", std::process::id()));
		let _ = std::fs::create_dir_all(&dir);
		accept_eula(&dir).unwrap();
		let content = std::fs::read_to_string(dir.join(EULA_FILE)).unwrap();
		assert_eq!(content, "eula=true");
		let _ = std::fs::remove_dir_all(&dir);
	}
}
