use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::supervisor::ProcessSupervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
	/// The request occupies the single pending slot and will run next.
	Scheduled,
	/// A restart was already pending; this request folds into it.
	Coalesced,
	/// The coordinator has shut down; nothing will run.
	Unavailable,
}

/// Entry point for the plugin watcher. Restarts run one at a time on a
/// dedicated worker; the queue in front of it holds a single slot, so any
/// number of requests made while a restart is in flight yield exactly one
/// follow-up restart.
pub struct RestartCoordinator {
	slot: mpsc::Sender<()>,
	closing: watch::Sender<bool>,
	shared: Arc<Shared>,
	worker: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
	in_flight: AtomicBool,
	completed: AtomicU64,
}

impl RestartCoordinator {
	pub fn spawn(supervisor: Arc<ProcessSupervisor>) -> Self {
		let (slot, mut requests) = mpsc::channel::<()>(1);
		let (closing, mut closed) = watch::channel(false);
		let shared = Arc::new(Shared::default());

		let state = Arc::clone(&shared);
		let worker = tokio::spawn(async move {
			loop {
				// A pending request never outlives shutdown.
				tokio::select! {
					biased;
					_ = closed.changed() => break,
					request = requests.recv() => {
						if request.is_none() {
							break;
						}
					}
				}
				state.in_flight.store(true, Ordering::SeqCst);
				let console = supervisor.console();
				console.notice("Restarting server to apply plugin changes...");
				match supervisor.restart().await {
					Ok(pid) => tracing::info!("restart complete, server pid {}", pid),
					Err(e) if e.is_fatal() => {
						console.notice(&format!(
							"Restart aborted: {}; the old server may still be running",
							e
						));
					}
					Err(e) => console.notice(&format!("Failed to restart server: {}", e)),
				}
				state.in_flight.store(false, Ordering::SeqCst);
				state.completed.fetch_add(1, Ordering::SeqCst);
			}
		});

		Self {
			slot,
			closing,
			shared,
			worker,
		}
	}

	/// Never blocks. Errors from the resulting restart are printed, not
	/// retried: it takes another change (or `!restart`) to try again.
	pub fn request_restart(&self) -> RequestOutcome {
		match self.slot.try_send(()) {
			Ok(()) => RequestOutcome::Scheduled,
			Err(mpsc::error::TrySendError::Full(())) => {
				tracing::debug!("restart already pending, coalescing request");
				RequestOutcome::Coalesced
			}
			Err(mpsc::error::TrySendError::Closed(())) => {
				tracing::error!("restart worker is gone, dropping request");
				RequestOutcome::Unavailable
			}
		}
	}

	pub fn in_flight(&self) -> bool {
		self.shared.in_flight.load(Ordering::SeqCst)
	}

	/// Restarts finished so far, successful or not.
	pub fn completed(&self) -> u64 {
		self.shared.completed.load(Ordering::SeqCst)
	}

	/// Stop accepting requests and wait for an in-flight restart to finish.
	/// A request still queued behind it is discarded.
	pub async fn shutdown(self) {
		self.closing.send_replace(true);
		drop(self.slot);
		let _ = self.worker.await;
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn dead_worker_is_reported() {
		let (slot, requests) = mpsc::channel(1);
		drop(requests);
		let coordinator = RestartCoordinator {
			slot,
			closing: watch::channel(false).0,
			shared: Arc::new(Shared::default()),
			worker: tokio::spawn(async {}),
		};
		assert_eq!(coordinator.request_restart(), RequestOutcome::Unavailable);
		assert_eq!(coordinator.completed(), 0);
	}
}
