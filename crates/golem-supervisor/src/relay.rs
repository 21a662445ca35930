use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

use crate::console::ConsoleSink;
use crate::supervisor::ExitSignal;
use crate::types::StreamOrigin;

pub const MAX_LINE_LEN: usize = 256 * 1024;

const TRUNCATED_SUFFIX: &str = " (line truncated)";

/// Forwards one pipe of one server instance to the console, line by line.
///
/// A relay belongs to the instance (`generation`) it was spawned for. Once a
/// newer instance has started, anything the old pipe still produces is
/// discarded.
pub struct OutputRelay {
	pub origin: StreamOrigin,
	pub generation: u64,
	pub latest: Arc<AtomicU64>,
	pub console: ConsoleSink,
	pub exited: ExitSignal,
	pub drain_window: Duration,
}

impl OutputRelay {
	pub async fn run<R: AsyncRead + Unpin>(self, pipe: R) {
		let mut exited = self.exited.clone();
		let drain_window = self.drain_window;
		let origin = self.origin;

		let reading = self.pump(BufReader::new(pipe));
		tokio::pin!(reading);

		tokio::select! {
			_ = &mut reading => {}
			_ = async {
				exited.wait().await;
				tokio::time::sleep(drain_window).await;
			} => {
				tracing::debug!("{:?} relay stalled after exit, giving up", origin);
			}
		}
	}

	async fn pump<R: AsyncBufRead + Unpin>(&self, mut reader: R) {
		let mut line = Vec::with_capacity(4096);
		loop {
			match read_capped_line(&mut reader, &mut line, MAX_LINE_LEN).await {
				Ok(Some(truncated)) => {
					if self.is_stale() {
						tracing::debug!("discarding output from stale instance {}", self.generation);
						return;
					}
					let text = String::from_utf8_lossy(&line);
					let suffix = if truncated { TRUNCATED_SUFFIX } else { "" };
					self.console
						.print_line(&format!("{} {}{}", self.origin.tag(), text, suffix));
				}
				Ok(None) => return,
				Err(e) => {
					tracing::warn!("error reading server {:?}: {}", self.origin, e);
					return;
				}
			}
		}
	}

	fn is_stale(&self) -> bool {
		self.latest.load(Ordering::SeqCst) != self.generation
	}
}

/// Read one `\n`-terminated line into `line` (terminator and trailing `\r`
/// stripped), keeping at most `cap` bytes. Returns `Ok(None)` at end of
/// stream, otherwise whether the line was cut short.
pub async fn read_capped_line<R: AsyncBufRead + Unpin>(
	reader: &mut R,
	line: &mut Vec<u8>,
	cap: usize,
) -> io::Result<Option<bool>> {
	line.clear();
	let mut truncated = false;
	let mut read_any = false;

	loop {
		let available = reader.fill_buf().await?;
		if available.is_empty() {
			return Ok(if read_any { Some(truncated) } else { None });
		}
		read_any = true;

		let (chunk_len, found) = match available.iter().position(|&b| b == b'\n') {
			Some(i) => (i, true),
			None => (available.len(), false),
		};
		let room = cap.saturating_sub(line.len());
		if chunk_len > room {
			truncated = true;
		}
		line.extend_from_slice(&available[..chunk_len.min(room)]);
		reader.consume(chunk_len + usize::from(found));

		if found {
			if line.last() == Some(&b'\r') {
				line.pop();
			}
			return Ok(Some(truncated));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn lines(input: &[u8], cap: usize) -> Vec<(String, bool)> {
		let mut reader = input;
		let mut buf = Vec::new();
		let mut out = Vec::new();
		while let Some(truncated) = read_capped_line(&mut reader, &mut buf, cap).await.unwrap() {
			out.push((String::from_utf8_lossy(&buf).to_string(), truncated));
		}
		out
	}

	#[tokio::test]
	async fn splits_on_newline() {
		let got = lines(b"Starting server\r\nDone (3.2s)!\nlast", 64).await;
		assert_eq!(
			got,
			vec![
				("Starting server".to_string(), false),
				("Done (3.2s)!".to_string(), false),
				("last".to_string(), false),
			]
		);
	}

	#[tokio::test]
	async fn empty_lines_are_kept() {
		let got = lines(b"\n\nx\n", 64).await;
		assert_eq!(got.len(), 3);
		assert_eq!(got[0].0, "");
		assert_eq!(got[2].0, "x");
	}

	#[tokio::test]
	async fn overlong_line_truncated_not_fatal() {
		let mut input = vec![b'a'; 100];
		input.extend_from_slice(b"\nnext\n");
		let got = lines(&input, 10).await;
		assert_eq!(got[0], ("a".repeat(10), true));
		assert_eq!(got[1], ("next".to_string(), false));
	}

	#[tokio::test]
	async fn end_of_stream() {
		assert!(lines(b"", 64).await.is_empty());
	}

	fn relay(origin: StreamOrigin, generation: u64, latest: u64) -> (OutputRelay, Capture, ExitSender) {
		let cap = Capture::default();
		let (tx, exited) = ExitSignal::channel();
		let relay = OutputRelay {
			origin,
			generation,
			latest: Arc::new(AtomicU64::new(latest)),
			console: ConsoleSink::new(cap.clone()),
			exited,
			drain_window: Duration::from_millis(50),
		};
		(relay, cap, tx)
	}

	type ExitSender = tokio::sync::watch::Sender<Option<crate::types::ExitKind>>;

	use crate::console::tests::Capture;

	#[tokio::test]
	async fn tags_lines_by_origin() {
		let (out, cap, _tx) = relay(StreamOrigin::Stderr, 1, 1);
		out.run(&b"Could not bind port\n"[..]).await;
		assert_eq!(cap.text(), "[Server Error] Could not bind port\n");
	}

	#[tokio::test]
	async fn stale_instance_output_discarded() {
		let (out, cap, _tx) = relay(StreamOrigin::Stdout, 1, 2);
		out.run(&b"old instance says hi\n"[..]).await;
		assert_eq!(cap.text(), "");
	}

	#[tokio::test]
	async fn stalled_pipe_released_after_exit() {
		let (out, _cap, tx) = relay(StreamOrigin::Stdout, 1, 1);
		let (_keep_open, pipe) = tokio::io::duplex(64);
		let task = tokio::spawn(out.run(pipe));
		tx.send_replace(Some(crate::types::ExitKind::Clean));
		tokio::time::timeout(Duration::from_secs(2), task)
			.await
			.expect("relay should stop after the drain window")
			.unwrap();
	}
}
