use std::io;
use std::time::Duration;

/// Errors surfaced by supervisor operations. None of them crash the program;
/// only [`SupervisorError::KillFailed`] leaves the process state untrustworthy.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
	#[error("server is already running")]
	AlreadyRunning,

	#[error("failed to launch server: {context}: {source}")]
	LaunchFailed {
		context: String,
		#[source]
		source: io::Error,
	},

	#[error("server did not stop within {}s and was forcibly terminated", .0.as_secs())]
	UngracefulShutdown(Duration),

	#[error("failed to kill server (pid {pid}): {reason}")]
	KillFailed { pid: u32, reason: String },

	#[error("server is not running")]
	NotRunning,

	#[error("failed to send command to server: {0}")]
	InputFailed(#[source] io::Error),
}

impl SupervisorError {
	pub(crate) fn launch(context: impl Into<String>, source: io::Error) -> Self {
		SupervisorError::LaunchFailed {
			context: context.into(),
			source,
		}
	}

	/// True when the operator has to step in: a process that refuses to die
	/// may still hold the server's port and files.
	pub fn is_fatal(&self) -> bool {
		matches!(self, SupervisorError::KillFailed { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_kill_failure_is_fatal() {
		assert!(SupervisorError::KillFailed { pid: 1, reason: "EPERM".into() }.is_fatal());
		assert!(!SupervisorError::UngracefulShutdown(Duration::from_secs(30)).is_fatal());
		assert!(!SupervisorError::NotRunning.is_fatal());
		assert!(!SupervisorError::AlreadyRunning.is_fatal());
	}

	#[test]
	fn messages() {
		let err = SupervisorError::UngracefulShutdown(Duration::from_secs(30));
		assert_eq!(
			err.to_string(),
			"server did not stop within 30s and was forcibly terminated"
		);
		let err = SupervisorError::launch(
			"spawn java",
			io::Error::new(io::ErrorKind::NotFound, "no such file"),
		);
		assert_eq!(err.to_string(), "failed to launch server: spawn java: no such file");
	}
}
