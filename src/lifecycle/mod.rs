//! Process lifecycle supervision.
//!
//! # Data Flow
//! ```text
//! Startup (supervisor.rs):
//!     Launchers in table order → skip disabled → launch → record handle
//!     First failure → unwind recorded handles in reverse → Startup error
//!
//! Shutdown (supervisor.rs):
//!     Trigger (signal / admin request / fatal report)
//!     → reverse order: close named listener → shut down process
//!     → close any remaining listeners
//!     All steps share one grace deadline.
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - A process handle is a trait object with a single async `shutdown`
//! - Shutdown failures are collected, never short-circuited
//! - A handle that misses the deadline is recorded as timed out and abandoned

pub mod error;
pub mod launcher;
pub mod process;
pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use error::{BoxError, LifecycleError, ShutdownFailure, ShutdownFailureKind, ShutdownReport};
pub use launcher::{check_dependencies, Launcher};
pub use process::{NoopProcess, Process, ShutdownContext, ShutdownFn, TaskProcess};
pub use shutdown::{fatal_channel, FatalError, FatalSender, Shutdown, ShutdownTrigger};
pub use supervisor::{Supervisor, SupervisorSettings};
