//! The single writer to the terminal.
//!
//! Server output, operator replies and log lines all go through one
//! [`ConsoleSink`]. Every write happens under one lock: a visible prompt is
//! erased, the line is written, and the prompt (with whatever the operator
//! has typed so far) is drawn again. No producer can land in the middle of
//! another's line.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use owo_colors::OwoColorize;
use tracing_subscriber::fmt::MakeWriter;

pub const DEFAULT_PROMPT: &str = "golem> ";

#[derive(Clone)]
pub struct ConsoleSink {
	state: Arc<Mutex<ConsoleState>>,
}

struct ConsoleState {
	out: Box<dyn Write + Send>,
	prompt: String,
	input: String,
	prompt_visible: bool,
	line_ending: &'static str,
	colored: bool,
}

impl ConsoleSink {
	pub fn new(out: impl Write + Send + 'static) -> Self {
		Self {
			state: Arc::new(Mutex::new(ConsoleState {
				out: Box::new(out),
				prompt: DEFAULT_PROMPT.to_string(),
				input: String::new(),
				prompt_visible: false,
				line_ending: "\n",
				colored: false,
			})),
		}
	}

	pub fn stdout() -> Self {
		Self::new(io::stdout())
	}

	pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
		self.lock().prompt = prompt.into();
		self
	}

	/// Raw terminals don't translate `\n`, so lines end in `\r\n`.
	pub fn raw_mode(self, raw: bool) -> Self {
		self.lock().line_ending = if raw { "\r\n" } else { "\n" };
		self
	}

	pub fn colored(self, colored: bool) -> Self {
		self.lock().colored = colored;
		self
	}

	pub fn is_colored(&self) -> bool {
		self.lock().colored
	}

	fn lock(&self) -> MutexGuard<'_, ConsoleState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Write errors are dropped: a broken terminal must not take the
	/// supervisor down with it.
	pub fn print_line(&self, text: &str) {
		let mut state = self.lock();
		let _ = state.write_lines(std::iter::once(text));
	}

	/// Print a block of lines that no other writer may split.
	pub fn print_block<'a>(&self, lines: impl IntoIterator<Item = &'a str>) {
		let mut state = self.lock();
		let _ = state.write_lines(lines);
	}

	/// A supervisor message, tagged so it stands apart from server output.
	pub fn notice(&self, message: &str) {
		let colored = self.is_colored();
		let line = if colored {
			format!("{} {}", "[Golem]".cyan().bold(), message)
		} else {
			format!("[Golem] {}", message)
		};
		self.print_line(&line);
	}

	pub fn show_prompt(&self) {
		let mut state = self.lock();
		if state.prompt_visible {
			return;
		}
		state.prompt_visible = true;
		let _ = state.draw_prompt();
	}

	pub fn hide_prompt(&self) {
		let mut state = self.lock();
		if !state.prompt_visible {
			return;
		}
		state.prompt_visible = false;
		let _ = state.erase().and_then(|_| state.out.flush());
	}

	pub fn is_prompt_visible(&self) -> bool {
		self.lock().prompt_visible
	}

	/// Replace the partially typed line and redraw it.
	pub fn set_input(&self, input: &str) {
		let mut state = self.lock();
		state.input.clear();
		state.input.push_str(input);
		if state.prompt_visible {
			let _ = state.erase().and_then(|_| state.draw_prompt());
		}
	}

	pub fn input(&self) -> String {
		self.lock().input.clone()
	}

	/// The operator pressed Enter: the echoed line stays on screen, the prompt
	/// goes away until the next read, and the typed text is handed back.
	pub fn take_input(&self) -> String {
		let mut state = self.lock();
		if state.prompt_visible {
			state.prompt_visible = false;
			let ending = state.line_ending;
			let _ = state.out.write_all(ending.as_bytes()).and_then(|_| state.out.flush());
		}
		std::mem::take(&mut state.input)
	}
}

impl ConsoleState {
	fn erase(&mut self) -> io::Result<()> {
		self.out.write_all(b"\r")?;
		queue!(self.out, Clear(ClearType::CurrentLine))
	}

	fn draw_prompt(&mut self) -> io::Result<()> {
		self.out.write_all(self.prompt.as_bytes())?;
		self.out.write_all(self.input.as_bytes())?;
		self.out.flush()
	}

	fn write_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) -> io::Result<()> {
		if self.prompt_visible {
			self.erase()?;
		}
		for text in lines {
			for line in text.split('\n') {
				self.out.write_all(line.trim_end_matches('\r').as_bytes())?;
				self.out.write_all(self.line_ending.as_bytes())?;
			}
		}
		if self.prompt_visible {
			self.draw_prompt()
		} else {
			self.out.flush()
		}
	}
}

/// Buffers one formatted tracing event and prints it through the sink when
/// the subscriber is done with it.
pub struct LogLine {
	sink: ConsoleSink,
	buf: Vec<u8>,
}

impl Write for LogLine {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.buf.extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl Drop for LogLine {
	fn drop(&mut self) {
		if self.buf.is_empty() {
			return;
		}
		let text = String::from_utf8_lossy(&self.buf);
		self.sink.print_line(text.trim_end_matches(['\n', '\r']));
	}
}

impl<'a> MakeWriter<'a> for ConsoleSink {
	type Writer = LogLine;

	fn make_writer(&'a self) -> Self::Writer {
		LogLine {
			sink: self.clone(),
			buf: Vec::new(),
		}
	}
}
