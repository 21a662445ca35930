use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use golem_supervisor::{ConsoleSink, RestartCoordinator};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginChange {
	Added(String),
	Changed { name: String, old: String, new: String },
}

impl PluginChange {
	pub fn name(&self) -> &str {
		match self {
			PluginChange::Added(name) => name,
			PluginChange::Changed { name, .. } => name,
		}
	}
}

/// Polls a development directory for plugin jars and copies new or modified
/// ones into the server's plugins directory.
pub struct PluginWatcher {
	source: PathBuf,
	plugins_dir: PathBuf,
	hashes: HashMap<String, String>,
	console: ConsoleSink,
}

impl PluginWatcher {
	pub fn new(source: impl Into<PathBuf>, plugins_dir: impl Into<PathBuf>, console: ConsoleSink) -> Self {
		Self {
			source: source.into(),
			plugins_dir: plugins_dir.into(),
			hashes: HashMap::new(),
			console,
		}
	}

	/// Record and copy every plugin already present. Returns how many were
	/// found.
	pub async fn prime(&mut self) -> io::Result<usize> {
		let jars = list_jars(&self.source).await?;
		for (name, path) in &jars {
			let hash = match hash_file(path).await {
				Ok(hash) => hash,
				Err(e) => {
					tracing::warn!("failed to hash {}: {}", path.display(), e);
					continue;
				}
			};
			tracing::info!("found plugin {} (hash {})", name, short(&hash));
			self.hashes.insert(name.clone(), hash);
			if let Err(e) = self.install(name, path).await {
				tracing::error!("failed to copy plugin {}: {}", name, e);
			}
		}
		Ok(self.hashes.len())
	}

	/// One pass over the directory. Returns the changes that were copied into
	/// place and so need a restart.
	pub async fn scan(&mut self) -> io::Result<Vec<PluginChange>> {
		let jars = list_jars(&self.source).await?;
		let mut applied = Vec::new();

		for (name, path) in jars {
			let hash = match hash_file(&path).await {
				Ok(hash) => hash,
				Err(e) => {
					tracing::warn!("failed to hash {}: {}", path.display(), e);
					continue;
				}
			};
			let change = match self.hashes.insert(name.clone(), hash.clone()) {
				None => PluginChange::Added(name.clone()),
				Some(old) if old != hash => PluginChange::Changed {
					name: name.clone(),
					old,
					new: hash,
				},
				Some(_) => continue,
			};

			match &change {
				PluginChange::Added(name) => {
					self.console.notice(&format!("New plugin detected: {}", name));
				}
				PluginChange::Changed { name, old, new } => {
					self.console.notice(&format!(
						"Plugin changed: {} (hash {} → {})",
						name,
						short(old),
						short(new)
					));
				}
			}

			match self.install(&name, &path).await {
				Ok(()) => applied.push(change),
				Err(e) => tracing::error!("failed to copy plugin {}: {}", name, e),
			}
		}

		Ok(applied)
	}

	async fn install(&self, name: &str, path: &Path) -> io::Result<()> {
		tokio::fs::create_dir_all(&self.plugins_dir).await?;
		let dest = self.plugins_dir.join(name);
		tracing::debug!("copying {} to {}", path.display(), dest.display());
		tokio::fs::copy(path, &dest).await?;
		Ok(())
	}

	/// Scan every `interval` until cancelled, asking for one restart per scan
	/// that applied anything.
	pub async fn run(mut self, interval: Duration, restarts: RestartCoordinator, mut cancel: watch::Receiver<bool>) {
		self.console.notice(&format!(
			"Watching {} for plugin changes",
			self.source.display()
		));
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		ticker.tick().await;

		loop {
			tokio::select! {
				_ = ticker.tick() => {}
				_ = cancel.changed() => break,
			}
			match self.scan().await {
				Ok(changes) if !changes.is_empty() => {
					let names: Vec<_> = changes.iter().map(PluginChange::name).collect();
					tracing::debug!("requesting restart for {}", names.join(", "));
					restarts.request_restart();
				}
				Ok(_) => {}
				Err(e) => tracing::warn!("failed to read watch directory {}: {}", self.source.display(), e),
			}
		}

		tracing::debug!("plugin watcher stopped");
		restarts.shutdown().await;
	}
}

/// A running watcher and the restart coordinator it feeds.
pub struct WatcherTask {
	cancel: watch::Sender<bool>,
	task: Option<JoinHandle<()>>,
}

impl WatcherTask {
	pub fn spawn(watcher: PluginWatcher, interval: Duration, restarts: RestartCoordinator) -> Self {
		let (cancel, cancelled) = watch::channel(false);
		let task = tokio::spawn(watcher.run(interval, restarts, cancelled));
		Self {
			cancel,
			task: Some(task),
		}
	}

	/// Stop scanning and wait out an in-flight restart. Queued restarts are
	/// dropped, so the server stays down after a subsequent stop. Safe to call
	/// more than once.
	pub async fn stop(&mut self) {
		let Some(task) = self.task.take() else {
			return;
		};
		self.cancel.send_replace(true);
		if let Err(e) = task.await {
			tracing::error!("plugin watcher task failed: {}", e);
		}
	}
}

fn is_jar(path: &Path) -> bool {
	path.extension()
		.and_then(|e| e.to_str())
		.is_some_and(|e| e.eq_ignore_ascii_case("jar"))
}

async fn list_jars(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
	let mut entries = tokio::fs::read_dir(dir).await?;
	let mut jars = Vec::new();
	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		if !entry.file_type().await?.is_file() || !is_jar(&path) {
			continue;
		}
		jars.push((entry.file_name().to_string_lossy().into_owned(), path));
	}
	jars.sort();
	Ok(jars)
}

pub async fn hash_file(path: &Path) -> io::Result<String> {
	let bytes = tokio::fs::read(path).await?;
	Ok(hex::encode(Sha256::digest(&bytes)))
}

fn short(hash: &str) -> &str {
	&hash[..hash.len().min(8)]
}
