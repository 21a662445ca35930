use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::time::Instant;
use tokio::sync::{broadcast, watch, Mutex};

use crate::console::ConsoleSink;
use crate::error::SupervisorError;
use crate::launch::{self, LaunchSpec, SupervisorConfig};
use crate::relay::OutputRelay;
use crate::types::*;

/// One-shot notification that a specific server instance has terminated.
/// Any number of clones can wait on it; it fires exactly once.
#[derive(Clone)]
pub struct ExitSignal {
	rx: watch::Receiver<Option<ExitKind>>,
}

impl ExitSignal {
	pub(crate) fn channel() -> (watch::Sender<Option<ExitKind>>, Self) {
		let (tx, rx) = watch::channel(None);
		(tx, Self { rx })
	}

	/// Resolves once the process is gone. A monitor that vanished without
	/// reporting counts as an exit with unknown status.
	pub async fn wait(&mut self) -> ExitKind {
		match self.rx.wait_for(Option::is_some).await {
			Ok(kind) => (*kind).unwrap_or(ExitKind::Unknown),
			Err(_) => ExitKind::Unknown,
		}
	}

	pub fn status(&self) -> Option<ExitKind> {
		*self.rx.borrow()
	}
}

/// Sends the forced-termination signal for a server pid.
pub type KillFn = fn(u32) -> Result<(), SupervisorError>;

/// The live server instance. Owned by the supervisor; the stdin pipe closes
/// once the handle and any in-progress write are gone.
pub struct ProcessHandle {
	pub pid: u32,
	pub generation: u64,
	input: Arc<Mutex<ChildStdin>>,
	exited: ExitSignal,
}

impl ProcessHandle {
	pub fn exit_signal(&self) -> ExitSignal {
		self.exited.clone()
	}
}

async fn write_line(input: &Mutex<ChildStdin>, line: &str) -> std::io::Result<()> {
	let mut data = Vec::with_capacity(line.len() + 1);
	data.extend_from_slice(line.as_bytes());
	data.push(b'\n');
	let mut input = input.lock().await;
	input.write_all(&data).await?;
	input.flush().await
}

struct Slot {
	state: SupervisorState,
	handle: Option<ProcessHandle>,
}

pub struct ProcessSupervisor {
	slot: Mutex<Slot>,
	state_tx: watch::Sender<SupervisorState>,
	transitions: broadcast::Sender<Transition>,
	latest_generation: Arc<AtomicU64>,
	spec: LaunchSpec,
	config: SupervisorConfig,
	console: ConsoleSink,
	kill: KillFn,
}

impl ProcessSupervisor {
	pub fn new(spec: LaunchSpec, config: SupervisorConfig, console: ConsoleSink) -> Arc<Self> {
		Self::with_kill_fn(spec, config, console, force_kill)
	}

	/// Like [`new`](Self::new) with a custom forced-termination step.
	pub fn with_kill_fn(
		spec: LaunchSpec,
		config: SupervisorConfig,
		console: ConsoleSink,
		kill: KillFn,
	) -> Arc<Self> {
		let (state_tx, _) = watch::channel(SupervisorState::Stopped);
		let (transitions, _) = broadcast::channel(256);
		Arc::new(Self {
			slot: Mutex::new(Slot {
				state: SupervisorState::Stopped,
				handle: None,
			}),
			state_tx,
			transitions,
			latest_generation: Arc::new(AtomicU64::new(0)),
			spec,
			config,
			console,
			kill,
		})
	}

	pub fn state(&self) -> SupervisorState {
		*self.state_tx.borrow()
	}

	pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
		self.state_tx.subscribe()
	}

	pub fn subscribe_transitions(&self) -> broadcast::Receiver<Transition> {
		self.transitions.subscribe()
	}

	pub fn console(&self) -> &ConsoleSink {
		&self.console
	}

	pub fn config(&self) -> &SupervisorConfig {
		&self.config
	}

	pub async fn pid(&self) -> Option<u32> {
		self.slot.lock().await.handle.as_ref().map(|h| h.pid)
	}

	pub async fn start(self: &Arc<Self>) -> Result<u32, SupervisorError> {
		let mut slot = self.slot.lock().await;
		self.start_locked(&mut slot).await
	}

	/// Stopping a stopped server is a no-op.
	pub async fn stop(&self) -> Result<(), SupervisorError> {
		let mut slot = self.slot.lock().await;
		self.stop_locked(&mut slot).await
	}

	/// Stop, let the OS release the old instance's files and sockets, start.
	/// A forced shutdown still counts as stopped; a failed kill aborts before
	/// a second instance can collide with the first.
	pub async fn restart(self: &Arc<Self>) -> Result<u32, SupervisorError> {
		let mut slot = self.slot.lock().await;

		if slot.handle.is_some() {
			match self.stop_locked(&mut slot).await {
				Ok(()) => {}
				Err(e @ SupervisorError::UngracefulShutdown(_)) => {
					tracing::warn!("{}, continuing restart", e);
				}
				Err(e) => return Err(e),
			}
			tracing::info!(
				"waiting {}s before starting again",
				self.config.settle_delay.as_secs_f32()
			);
			tokio::time::sleep(self.config.settle_delay).await;
		} else {
			tracing::info!("no server process to stop, starting fresh");
		}

		self.start_locked(&mut slot).await
	}

	/// Forward one operator line to the server's stdin. The write happens
	/// outside the lifecycle lock, so a server that stopped reading can't
	/// hold up a stop; it fails after `input_timeout` instead.
	pub async fn send_line(&self, line: &str) -> Result<(), SupervisorError> {
		let input = {
			let slot = self.slot.lock().await;
			if slot.state != SupervisorState::Running {
				return Err(SupervisorError::NotRunning);
			}
			let handle = slot.handle.as_ref().ok_or(SupervisorError::NotRunning)?;
			Arc::clone(&handle.input)
		};
		match tokio::time::timeout(self.config.input_timeout, write_line(&input, line)).await {
			Ok(result) => result.map_err(SupervisorError::InputFailed),
			Err(_) => Err(SupervisorError::InputFailed(std::io::Error::new(
				std::io::ErrorKind::TimedOut,
				"server is not reading its input",
			))),
		}
	}

	fn transition(&self, slot: &mut Slot, to: SupervisorState) {
		let from = slot.state;
		debug_assert!(from.can_transition_to(to), "invalid transition {} -> {}", from, to);
		slot.state = to;
		self.state_tx.send_replace(to);
		let _ = self.transitions.send(Transition { from, to });
		tracing::debug!("server {} -> {}", from, to);
	}

	async fn start_locked(self: &Arc<Self>, slot: &mut Slot) -> Result<u32, SupervisorError> {
		if slot.state != SupervisorState::Stopped {
			return Err(SupervisorError::AlreadyRunning);
		}
		self.transition(slot, SupervisorState::Starting);

		match self.spawn_instance() {
			Ok(handle) => {
				let pid = handle.pid;
				slot.handle = Some(handle);
				self.transition(slot, SupervisorState::Running);
				tracing::info!("server started with pid {}", pid);
				Ok(pid)
			}
			Err(e) => {
				self.transition(slot, SupervisorState::Stopped);
				Err(e)
			}
		}
	}

	fn spawn_instance(self: &Arc<Self>) -> Result<ProcessHandle, SupervisorError> {
		if let Some(artifact) = &self.spec.artifact {
			if !artifact.exists() {
				return Err(SupervisorError::launch(
					format!("server jar not found at {}", artifact.display()),
					std::io::Error::from(std::io::ErrorKind::NotFound),
				));
			}
		}
		if self.spec.accept_eula {
			launch::accept_eula(&self.spec.working_dir)
				.map_err(|e| SupervisorError::launch("write eula.txt", e))?;
		}

		let mut child = self
			.spec
			.to_command()
			.spawn()
			.map_err(|e| SupervisorError::launch(format!("spawn {}", self.spec.program.display()), e))?;

		let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
		let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
			let _ = child.start_kill();
			return Err(SupervisorError::launch(
				"open stdio pipes",
				std::io::Error::from(std::io::ErrorKind::BrokenPipe),
			));
		};
		let Some(pid) = child.id() else {
			return Err(SupervisorError::launch(
				"read pid",
				std::io::Error::from(std::io::ErrorKind::NotFound),
			));
		};

		let generation = self.latest_generation.fetch_add(1, Ordering::SeqCst) + 1;
		let (exit_tx, exited) = ExitSignal::channel();

		let sup = Arc::clone(self);
		tokio::spawn(async move {
			sup.monitor_exit(child, generation, exit_tx).await;
		});

		self.spawn_relay(StreamOrigin::Stdout, stdout, generation, &exited);
		self.spawn_relay(StreamOrigin::Stderr, stderr, generation, &exited);

		Ok(ProcessHandle {
			pid,
			generation,
			input: Arc::new(Mutex::new(stdin)),
			exited,
		})
	}

	fn spawn_relay<R>(&self, origin: StreamOrigin, pipe: R, generation: u64, exited: &ExitSignal)
	where
		R: tokio::io::AsyncRead + Send + Unpin + 'static,
	{
		let relay = OutputRelay {
			origin,
			generation,
			latest: Arc::clone(&self.latest_generation),
			console: self.console.clone(),
			exited: exited.clone(),
			drain_window: self.config.drain_window,
		};
		tokio::spawn(relay.run(pipe));
	}

	/// Waits for the OS process, fires the exit signal, then releases the
	/// handle if nobody else has already.
	async fn monitor_exit(
		self: Arc<Self>,
		mut child: Child,
		generation: u64,
		exit_tx: watch::Sender<Option<ExitKind>>,
	) {
		let kind = match child.wait().await {
			Ok(status) => ExitKind::from(status),
			Err(e) => {
				tracing::error!("failed to wait on server process: {}", e);
				ExitKind::Unknown
			}
		};
		exit_tx.send_replace(Some(kind));

		match kind {
			ExitKind::Clean => tracing::info!("server stopped gracefully"),
			other => tracing::warn!("server {}", other),
		}

		let mut slot = self.slot.lock().await;
		let ours = slot
			.handle
			.as_ref()
			.is_some_and(|h| h.generation == generation);
		if ours {
			slot.handle = None;
			if slot.state == SupervisorState::Running {
				self.transition(&mut slot, SupervisorState::Stopping);
			}
			self.transition(&mut slot, SupervisorState::Stopped);
		}
	}

	async fn stop_locked(&self, slot: &mut Slot) -> Result<(), SupervisorError> {
		let Some(handle) = slot.handle.as_ref() else {
			return Ok(());
		};
		let pid = handle.pid;
		let input = Arc::clone(&handle.input);
		let mut exited = handle.exit_signal();
		if slot.state == SupervisorState::Running {
			self.transition(slot, SupervisorState::Stopping);
		}

		// The directive write counts against the grace period: a server that
		// stopped reading stdin must not hold the lock forever.
		let grace = self.config.grace_period;
		let deadline = Instant::now() + grace;
		if exited.status().is_none() {
			tracing::info!("stopping server gracefully...");
			match tokio::time::timeout_at(deadline, write_line(&input, &self.config.stop_directive)).await {
				Ok(Ok(())) => {}
				Ok(Err(e)) => tracing::warn!("failed to send stop command: {}", e),
				Err(_) => tracing::warn!("stop command not accepted within {}s", grace.as_secs_f32()),
			}
		}
		let graceful = tokio::time::timeout_at(deadline, exited.wait()).await.is_ok();

		if !graceful {
			tracing::warn!("server did not stop within {}s, killing pid {}", grace.as_secs_f32(), pid);
			(self.kill)(pid)?;
			if tokio::time::timeout(self.config.kill_confirm, exited.wait())
				.await
				.is_err()
			{
				return Err(SupervisorError::KillFailed {
					pid,
					reason: "process still alive after SIGKILL".to_string(),
				});
			}
		}

		slot.handle = None;
		self.transition(slot, SupervisorState::Stopped);

		if graceful {
			Ok(())
		} else {
			Err(SupervisorError::UngracefulShutdown(grace))
		}
	}
}

/// SIGKILL the server's whole process group. A group that is already gone
/// is not an error.
fn force_kill(pid: u32) -> Result<(), SupervisorError> {
	use nix::errno::Errno;
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;

	match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
		Ok(()) | Err(Errno::ESRCH) => Ok(()),
		Err(e) => Err(SupervisorError::KillFailed {
			pid,
			reason: e.to_string(),
		}),
	}
}
