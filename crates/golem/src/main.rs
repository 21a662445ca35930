mod config;
mod input;
mod watcher;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use golem_supervisor::router::{classify, Command, Directive};
use golem_supervisor::{CommandRouter, ConsoleSink, Flow, ProcessSupervisor, RestartCoordinator};
use tracing_subscriber::EnvFilter;

use config::Config;
use input::{InputEvent, RawModeGuard};
use watcher::{PluginWatcher, WatcherTask};

#[derive(Parser, Debug)]
#[command(name = "golem", version, about = "Run a Minecraft server behind an interactive console")]
struct Args {
	/// Path to the config file (JSON, or TOML by extension)
	#[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
	config: PathBuf,

	/// Watch a directory for plugin jars and restart the server when they change
	#[arg(long, value_name = "DIR")]
	watch: Option<PathBuf>,

	/// Start the server immediately
	#[arg(long)]
	auto_start: bool,

	/// Read plain lines from stdin even when it is a terminal
	#[arg(long)]
	no_prompt: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = Config::load(&args.config)?;
	let artifact = config.artifact_path();
	if !artifact.is_file() {
		bail!("server jar not found at {}", artifact.display());
	}

	let interactive = !args.no_prompt && std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
	let colored = std::io::stdout().is_terminal();
	let console = ConsoleSink::stdout().raw_mode(interactive).colored(colored);

	tracing_subscriber::fmt()
		.with_writer(console.clone())
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_target(false)
		.with_ansi(colored)
		.init();

	let _raw = if interactive {
		Some(RawModeGuard::enable().context("failed to put the terminal in raw mode")?)
	} else {
		None
	};

	let supervisor = ProcessSupervisor::new(config.launch_spec(), config.supervisor_config(), console.clone());
	let router = CommandRouter::new(supervisor.clone());

	// Plugins are in place before the first start.
	let mut watcher = match &args.watch {
		Some(dir) => {
			let mut watcher = PluginWatcher::new(dir, config.plugins_dir(), console.clone());
			let found = watcher
				.prime()
				.await
				.with_context(|| format!("failed to read watch directory {}", dir.display()))?;
			tracing::info!("copied {} plugin(s) into {}", found, config.plugins_dir().display());
			let restarts = RestartCoordinator::spawn(supervisor.clone());
			Some(WatcherTask::spawn(watcher, config.watch_interval(), restarts))
		}
		None => None,
	};

	if args.auto_start {
		if let Err(e) = supervisor.start().await {
			console.notice(&format!("Failed to start server: {}", e));
		}
	} else {
		console.notice("Server not started. Use !restart to start it.");
	}
	console.notice("Type !help for available commands.");

	let mut events = if interactive {
		input::spawn_terminal(console.clone())
	} else {
		input::spawn_lines()
	};

	loop {
		if interactive {
			console.show_prompt();
		}
		let event = tokio::select! {
			event = events.recv() => event.unwrap_or(InputEvent::Eof),
			_ = tokio::signal::ctrl_c() => InputEvent::Interrupt,
		};
		match event {
			InputEvent::Line(line) => {
				// Nothing the watcher queued may restart the server once the
				// operator asked to leave.
				if let (Command::Directive(Directive::Exit), Some(watcher)) = (classify(&line), watcher.as_mut()) {
					watcher.stop().await;
				}
				// Errors are already on the console.
				if let Ok(Flow::Exit) = router.dispatch(&line).await {
					break;
				}
			}
			InputEvent::Interrupt | InputEvent::Eof => {
				console.hide_prompt();
				console.notice("Stopping server and exiting Golem...");
				break;
			}
		}
	}

	if let Some(watcher) = watcher.as_mut() {
		watcher.stop().await;
	}
	if let Err(e) = supervisor.stop().await {
		console.notice(&format!("Failed to stop server: {}", e));
	}
	console.hide_prompt();

	Ok(())
}
