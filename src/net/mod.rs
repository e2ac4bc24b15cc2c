//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Network launcher
//!     → listener::bind (ManagedListener + ListenerHandle)
//!     → ListenerRegistry::register(name, handle)
//!     → axum::serve(ManagedListener, router) in a background task
//!
//! Shutdown sweep, per process:
//!     → ListenerRegistry::close(name)   (socket released)
//!     → Process::shutdown               (serve task joined)
//! ```
//!
//! # Design Decisions
//! - One listener per subsystem name; a duplicate is a startup error
//! - Closing waits for the socket to be released, not just signalled
//! - Closing is idempotent

pub mod listener;

pub use listener::{bind, ListenerError, ListenerHandle, ListenerRegistry, ManagedListener};
