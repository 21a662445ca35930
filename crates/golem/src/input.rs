use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use golem_supervisor::router::{common_prefix, complete};
use golem_supervisor::ConsoleSink;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
	Line(String),
	/// Ctrl-C.
	Interrupt,
	/// Ctrl-D on an empty line, or stdin closed.
	Eof,
}

/// Keeps the terminal in raw mode for as long as it lives.
pub struct RawModeGuard;

impl RawModeGuard {
	pub fn enable() -> std::io::Result<Self> {
		terminal::enable_raw_mode()?;
		Ok(Self)
	}
}

impl Drop for RawModeGuard {
	fn drop(&mut self) {
		let _ = terminal::disable_raw_mode();
	}
}

#[derive(Debug, PartialEq, Eq)]
pub enum Edit {
	Ignore,
	Redraw,
	Submit(String),
	/// More than one completion matched; show them to the operator.
	Candidates(Vec<&'static str>),
	Interrupt,
	Eof,
}

/// The single-line editor behind the `golem> ` prompt. It only tracks the
/// buffer; drawing goes through the console.
#[derive(Debug, Default)]
pub struct LineEditor {
	buf: String,
}

impl LineEditor {
	pub fn buffer(&self) -> &str {
		&self.buf
	}

	pub fn handle(&mut self, key: KeyEvent) -> Edit {
		if key.kind == KeyEventKind::Release {
			return Edit::Ignore;
		}
		let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
		match key.code {
			KeyCode::Char('c') if ctrl => {
				self.buf.clear();
				Edit::Interrupt
			}
			KeyCode::Char('d') if ctrl => {
				if self.buf.is_empty() {
					Edit::Eof
				} else {
					Edit::Ignore
				}
			}
			KeyCode::Char('u') if ctrl => {
				self.buf.clear();
				Edit::Redraw
			}
			KeyCode::Char(_) if ctrl => Edit::Ignore,
			KeyCode::Char(c) => {
				self.buf.push(c);
				Edit::Redraw
			}
			KeyCode::Backspace => {
				if self.buf.pop().is_some() {
					Edit::Redraw
				} else {
					Edit::Ignore
				}
			}
			KeyCode::Enter => Edit::Submit(std::mem::take(&mut self.buf)),
			KeyCode::Tab => self.complete(),
			_ => Edit::Ignore,
		}
	}

	// Only the first word is completed: directives and command names.
	fn complete(&mut self) -> Edit {
		if self.buf.contains(char::is_whitespace) {
			return Edit::Ignore;
		}
		let candidates = complete(&self.buf);
		match candidates.as_slice() {
			[] => Edit::Ignore,
			[only] => {
				self.buf = format!("{} ", only);
				Edit::Redraw
			}
			_ => {
				if let Some(prefix) = common_prefix(&candidates) {
					if prefix.len() > self.buf.len() {
						self.buf = prefix.to_string();
						return Edit::Redraw;
					}
				}
				Edit::Candidates(candidates)
			}
		}
	}
}

/// Read keys on a blocking thread and hand finished lines to the caller.
/// The thread ends when the receiver is dropped or the terminal errors.
pub fn spawn_terminal(console: ConsoleSink) -> mpsc::Receiver<InputEvent> {
	let (tx, rx) = mpsc::channel(16);
	std::thread::spawn(move || {
		let mut editor = LineEditor::default();
		loop {
			let key = match event::read() {
				Ok(Event::Key(key)) => key,
				Ok(_) => continue,
				Err(e) => {
					tracing::error!("failed to read terminal input: {}", e);
					let _ = tx.blocking_send(InputEvent::Eof);
					return;
				}
			};
			let event = match editor.handle(key) {
				Edit::Ignore => continue,
				Edit::Redraw => {
					console.set_input(editor.buffer());
					continue;
				}
				Edit::Candidates(candidates) => {
					console.print_line(&candidates.join("  "));
					continue;
				}
				Edit::Submit(line) => {
					console.take_input();
					InputEvent::Line(line)
				}
				Edit::Interrupt => {
					console.set_input("");
					InputEvent::Interrupt
				}
				Edit::Eof => InputEvent::Eof,
			};
			if tx.blocking_send(event).is_err() {
				return;
			}
		}
	});
	rx
}

/// Plain line input for pipes and `--no-prompt`.
pub fn spawn_lines() -> mpsc::Receiver<InputEvent> {
	let (tx, rx) = mpsc::channel(16);
	tokio::spawn(async move {
		let mut lines = BufReader::new(tokio::io::stdin()).lines();
		loop {
			let event = match lines.next_line().await {
				Ok(Some(line)) => InputEvent::Line(line),
				Ok(None) => InputEvent::Eof,
				Err(e) => {
					tracing::error!("failed to read stdin: {}", e);
					InputEvent::Eof
				}
			};
			let done = event == InputEvent::Eof;
			if tx.send(event).await.is_err() || done {
				return;
			}
		}
	});
	rx
}
