use std::fmt;
use std::process::ExitStatus;

/// Lifecycle of the supervised server. Exactly one process instance exists
/// while the state is anything other than `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorState {
	Stopped,
	Starting,
	Running,
	Stopping,
}

impl SupervisorState {
	pub fn is_running(&self) -> bool {
		matches!(self, SupervisorState::Running)
	}

	/// `Starting -> Stopped` is a failed launch. Everything else follows the
	/// start/stop cycle, including an exit nobody asked for.
	pub fn can_transition_to(&self, next: SupervisorState) -> bool {
		use SupervisorState::*;
		matches!(
			(self, next),
			(Stopped, Starting)
				| (Starting, Running)
				| (Starting, Stopped)
				| (Running, Stopping)
				| (Stopping, Stopped)
		)
	}
}

impl fmt::Display for SupervisorState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SupervisorState::Stopped => "stopped",
			SupervisorState::Starting => "starting",
			SupervisorState::Running => "running",
			SupervisorState::Stopping => "stopping",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
	pub from: SupervisorState,
	pub to: SupervisorState,
}

/// How a server instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
	Clean,
	Code(i32),
	Signal(i32),
	/// `wait()` itself failed; the process is gone but its status is lost.
	Unknown,
}

impl From<ExitStatus> for ExitKind {
	fn from(status: ExitStatus) -> Self {
		use std::os::unix::process::ExitStatusExt;
		if status.success() {
			ExitKind::Clean
		} else if let Some(code) = status.code() {
			ExitKind::Code(code)
		} else if let Some(signal) = status.signal() {
			ExitKind::Signal(signal)
		} else {
			ExitKind::Unknown
		}
	}
}

impl fmt::Display for ExitKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExitKind::Clean => write!(f, "exited cleanly"),
			ExitKind::Code(code) => write!(f, "exited with code {}", code),
			ExitKind::Signal(sig) => write!(f, "killed by signal {}", sig),
			ExitKind::Unknown => write!(f, "exited with unknown status"),
		}
	}
}

/// Which pipe of the child a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOrigin {
	Stdout,
	Stderr,
}

impl StreamOrigin {
	pub fn tag(&self) -> &'static str {
		match self {
			StreamOrigin::Stdout => "[Server]",
			StreamOrigin::Stderr => "[Server Error]",
		}
	}
}
