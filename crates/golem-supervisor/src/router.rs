use std::sync::Arc;

use owo_colors::OwoColorize;

use crate::console::ConsoleSink;
use crate::error::SupervisorError;
use crate::supervisor::ProcessSupervisor;

pub const DIRECTIVES: [&str; 4] = ["!help", "!exit", "!stop", "!restart"];

/// Common server commands offered by tab completion. Purely advisory: the
/// server decides what it accepts.
pub const SERVER_COMMANDS: &[&str] = &[
	"ban", "ban-ip", "banlist", "clear", "deop", "difficulty", "effect",
	"enchant", "gamemode", "gamerule", "give", "help", "kick", "kill",
	"list", "me", "op", "pardon", "pardon-ip", "plugins", "reload",
	"save-all", "save-off", "save-on", "say", "scoreboard", "seed",
	"setidletimeout", "setworldspawn", "spawnpoint", "stop", "tell",
	"teleport", "time", "timings", "tp", "version", "weather", "whitelist",
	"world", "xp",
];

const NOT_RUNNING: &str = "Server is not running. Use !restart to start it again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
	Help,
	Exit,
	Stop,
	Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
	Empty,
	Directive(Directive),
	Forward(&'a str),
}

/// What the input loop should do after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
	Continue,
	Exit,
}

/// Directives match exactly and case-sensitively; anything else that isn't
/// blank goes to the server as typed.
pub fn classify(line: &str) -> Command<'_> {
	let line = line.trim();
	match line {
		"" => Command::Empty,
		"!help" => Command::Directive(Directive::Help),
		"!exit" => Command::Directive(Directive::Exit),
		"!stop" => Command::Directive(Directive::Stop),
		"!restart" => Command::Directive(Directive::Restart),
		other => Command::Forward(other),
	}
}

/// Candidates for the word being typed: directives after a `!`, server
/// commands otherwise.
pub fn complete(prefix: &str) -> Vec<&'static str> {
	let pool: &[&'static str] = if prefix.starts_with('!') {
		&DIRECTIVES
	} else {
		SERVER_COMMANDS
	};
	pool.iter().copied().filter(|c| c.starts_with(prefix)).collect()
}

/// Longest common prefix of the candidates, for extending a partial word.
pub fn common_prefix<'a>(candidates: &[&'a str]) -> Option<&'a str> {
	let first = candidates.first()?;
	let len = candidates.iter().skip(1).fold(first.len(), |len, c| {
		first
			.bytes()
			.zip(c.bytes())
			.take(len)
			.take_while(|(a, b)| a == b)
			.count()
	});
	Some(&first[..len])
}

pub struct CommandRouter {
	supervisor: Arc<ProcessSupervisor>,
	console: ConsoleSink,
}

impl CommandRouter {
	pub fn new(supervisor: Arc<ProcessSupervisor>) -> Self {
		let console = supervisor.console().clone();
		Self { supervisor, console }
	}

	/// Handle one line of operator input. Every error is also printed, so
	/// callers only need the result to decide what to do next.
	pub async fn dispatch(&self, line: &str) -> Result<Flow, SupervisorError> {
		match classify(line) {
			Command::Empty => Ok(Flow::Continue),
			Command::Directive(Directive::Help) => {
				self.print_help();
				Ok(Flow::Continue)
			}
			Command::Directive(Directive::Exit) => {
				self.console.notice("Stopping server and exiting Golem...");
				if let Err(e) = self.supervisor.stop().await {
					self.report(&e);
				}
				Ok(Flow::Exit)
			}
			Command::Directive(Directive::Stop) => {
				self.console.notice("Stopping server only...");
				match self.supervisor.stop().await {
					Ok(()) => Ok(Flow::Continue),
					Err(e) => {
						self.report(&e);
						Err(e)
					}
				}
			}
			Command::Directive(Directive::Restart) => {
				self.console.notice("Restarting server...");
				match self.supervisor.restart().await {
					Ok(_) => Ok(Flow::Continue),
					Err(e) => {
						self.report(&e);
						Err(e)
					}
				}
			}
			Command::Forward(text) => match self.supervisor.send_line(text).await {
				Ok(()) => Ok(Flow::Continue),
				Err(SupervisorError::NotRunning) => {
					self.console.print_line(NOT_RUNNING);
					Err(SupervisorError::NotRunning)
				}
				Err(e) => {
					self.report(&e);
					Err(e)
				}
			},
		}
	}

	fn report(&self, err: &SupervisorError) {
		if err.is_fatal() {
			self.console.notice(&format!(
				"{}; the server may still be running, check it manually",
				err
			));
		} else {
			self.console.notice(&err.to_string());
		}
	}

	fn print_help(&self) {
		let header = if self.console.is_colored() {
			"Golem Commands:".bold().to_string()
		} else {
			"Golem Commands:".to_string()
		};
		self.console.print_block([
			"",
			header.as_str(),
			"  !help     - Display this help message",
			"  !exit     - Stop the server and exit Golem",
			"  !stop     - Stop the server but keep Golem running",
			"  !restart  - Restart the Minecraft server",
			"",
			"All other commands are sent directly to the Minecraft server.",
		]);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::console::tests::Capture;
	use crate::launch::{LaunchSpec, SupervisorConfig};

	#[test]
	fn classify_directives() {
		assert_eq!(classify("!help"), Command::Directive(Directive::Help));
		assert_eq!(classify("  !stop  "), Command::Directive(Directive::Stop));
		assert_eq!(classify("!restart"), Command::Directive(Directive::Restart));
		assert_eq!(classify("!exit"), Command::Directive(Directive::Exit));
	}

	#[test]
	fn classify_is_case_sensitive() {
		assert_eq!(classify("!STOP"), Command::Forward("!STOP"));
		assert_eq!(classify("!stopp"), Command::Forward("!stopp"));
	}

	#[test]
	fn classify_forward_and_empty() {
		assert_eq!(classify("say hello world"), Command::Forward("say hello world"));
		assert_eq!(classify("   "), Command::Empty);
		assert_eq!(classify(""), Command::Empty);
	}

	#[test]
	fn complete_directives() {
		assert_eq!(complete("!"), DIRECTIVES.to_vec());
		assert_eq!(complete("!re"), vec!["!restart"]);
		assert!(complete("!x").is_empty());
	}

	#[test]
	fn complete_server_commands() {
		assert_eq!(complete("save"), vec!["save-all", "save-off", "save-on"]);
		assert_eq!(complete("wh"), vec!["whitelist"]);
		assert_eq!(complete("").len(), SERVER_COMMANDS.len());
	}

	#[test]
	fn common_prefix_of_candidates() {
		assert_eq!(common_prefix(&["save-all", "save-off", "save-on"]), Some("save-"));
		assert_eq!(common_prefix(&["ban", "ban-ip", "banlist"]), Some("ban"));
		assert_eq!(common_prefix(&["tp"]), Some("tp"));
		assert_eq!(common_prefix(&[]), None);
	}

	fn idle_router() -> (CommandRouter, Capture) {
		let cap = Capture::default();
		let console = ConsoleSink::new(cap.clone());
		let spec = LaunchSpec::command("sh", ["-c", "cat"], std::env::temp_dir());
		let sup = ProcessSupervisor::new(spec, SupervisorConfig::default(), console);
		(CommandRouter::new(sup), cap)
	}

	#[tokio::test]
	async fn forward_without_server_reports_not_running() {
		let (router, cap) = idle_router();
		let result = router.dispatch("list").await;
		assert!(matches!(result, Err(SupervisorError::NotRunning)));
		assert!(cap.text().contains(NOT_RUNNING));
	}

	#[tokio::test]
	async fn help_changes_nothing() {
		let (router, cap) = idle_router();
		assert!(matches!(router.dispatch("!help").await, Ok(Flow::Continue)));
		assert!(cap.text().contains("!restart  - Restart the Minecraft server"));
		assert_eq!(router.supervisor.state(), crate::SupervisorState::Stopped);
	}

	#[tokio::test]
	async fn stop_when_stopped_is_ok() {
		let (router, _) = idle_router();
		assert!(matches!(router.dispatch("!stop").await, Ok(Flow::Continue)));
	}

	#[tokio::test]
	async fn exit_requests_exit() {
		let (router, cap) = idle_router();
		assert!(matches!(router.dispatch("!exit").await, Ok(Flow::Exit)));
		assert!(cap.text().contains("[Golem] Stopping server and exiting Golem..."));
	}

	#[tokio::test]
	async fn blank_line_ignored() {
		let (router, cap) = idle_router();
		assert!(matches!(router.dispatch("   ").await, Ok(Flow::Continue)));
		assert_eq!(cap.text(), "");
	}
}
