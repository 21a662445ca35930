//! # golem-supervisor
//!
//! Supervises a single long-running server process behind an interactive
//! console.
//!
//! Start, stop and restart are serialized by one lock and can be driven from
//! the operator's console, a file watcher, or the process exiting on its own.
//! Server output and operator messages share one [`ConsoleSink`] that never
//! splits a line.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use golem_supervisor::{CommandRouter, ConsoleSink, Flow, LaunchSpec, ProcessSupervisor, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let console = ConsoleSink::stdout();
//! let spec = LaunchSpec::java("java", "/srv/minecraft", "1G", "4G", "server.jar");
//! let sup = ProcessSupervisor::new(spec, SupervisorConfig::default(), console);
//!
//! sup.start().await.unwrap();
//!
//! let router = CommandRouter::new(sup.clone());
//! if router.dispatch("!exit").await.unwrap() == Flow::Exit {
//!     return;
//! }
//! # }
//! ```

pub mod console;
pub mod error;
pub mod launch;
pub mod relay;
pub mod restart;
pub mod router;
pub mod supervisor;
pub mod types;

pub use console::ConsoleSink;
pub use error::SupervisorError;
pub use launch::{LaunchSpec, SupervisorConfig};
pub use relay::OutputRelay;
pub use restart::{RequestOutcome, RestartCoordinator};
pub use router::{CommandRouter, Flow};
pub use supervisor::{ExitSignal, KillFn, ProcessHandle, ProcessSupervisor};
pub use types::*;
