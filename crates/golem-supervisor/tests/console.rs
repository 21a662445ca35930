use std::io::Write;
use std::sync::{Arc, Mutex};

use golem_supervisor::router::{classify, Command};
use golem_supervisor::ConsoleSink;
use proptest::prelude::*;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.0.lock().unwrap().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())
	}
}

const ERASE: &str = "\r\x1b[2K";

/// What a terminal would show for each finished line: everything after the
/// last erase on that line.
fn visible_lines(raw: &str) -> Vec<String> {
	let mut segments: Vec<&str> = raw.split('\n').collect();
	segments.pop();
	segments
		.into_iter()
		.map(|s| match s.rfind(ERASE) {
			Some(i) => s[i + ERASE.len()..].to_string(),
			None => s.to_string(),
		})
		.collect()
}

fn interleave(writers: usize, repeats: usize, with_prompt: bool) -> Vec<String> {
	let cap = Capture::default();
	let sink = ConsoleSink::new(cap.clone());
	if with_prompt {
		sink.show_prompt();
		sink.set_input("partial comm");
	}

	let handles: Vec<_> = (0..writers)
		.map(|w| {
			let sink = sink.clone();
			std::thread::spawn(move || {
				let text = format!("[Server] writer-{} {}", w, "x".repeat(w * 7 + 1));
				for _ in 0..repeats {
					sink.print_line(&text);
				}
			})
		})
		.collect();
	for h in handles {
		h.join().unwrap();
	}

	let raw = String::from_utf8(cap.0.lock().unwrap().clone()).unwrap();
	if with_prompt {
		assert!(raw.ends_with("golem> partial comm"), "prompt not redrawn last: {:?}", raw);
	}
	visible_lines(&raw)
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(32))]

	#[test]
	fn concurrent_lines_stay_whole(writers in 1usize..8, repeats in 1usize..40, with_prompt in any::<bool>()) {
		let lines = interleave(writers, repeats, with_prompt);
		prop_assert_eq!(lines.len(), writers * repeats);
		for w in 0..writers {
			let expected = format!("[Server] writer-{} {}", w, "x".repeat(w * 7 + 1));
			let count = lines.iter().filter(|l| **l == expected).count();
			prop_assert_eq!(count, repeats);
		}
	}

	#[test]
	fn non_directives_forward_verbatim(line in "[a-z][a-z0-9 _-]{0,40}") {
		let trimmed = line.trim();
		match classify(&line) {
			Command::Forward(text) => prop_assert_eq!(text, trimmed),
			Command::Empty => prop_assert!(trimmed.is_empty()),
			Command::Directive(d) => prop_assert!(false, "unexpected directive {:?}", d),
		}
	}
}

#[test]
fn tokio_tasks_share_the_sink() {
	let rt = tokio::runtime::Runtime::new().unwrap();
	let cap = Capture::default();
	let sink = ConsoleSink::new(cap.clone());
	sink.show_prompt();

	rt.block_on(async {
		let mut tasks = Vec::new();
		for t in 0..4 {
			let sink = sink.clone();
			tasks.push(tokio::spawn(async move {
				for i in 0..50 {
					sink.print_line(&format!("task {} line {}", t, i));
					tokio::task::yield_now().await;
				}
			}));
		}
		for task in tasks {
			task.await.unwrap();
		}
	});

	let raw = String::from_utf8(cap.0.lock().unwrap().clone()).unwrap();
	let lines = visible_lines(&raw);
	assert_eq!(lines.len(), 200);
	for t in 0..4 {
		let mine: Vec<_> = lines
			.iter()
			.filter(|l| l.starts_with(&format!("task {} ", t)))
			.collect();
		let expected: Vec<_> = (0..50).map(|i| format!("task {} line {}", t, i)).collect();
		assert_eq!(mine.iter().map(|s| s.as_str()).collect::<Vec<_>>(), expected);
	}
}
