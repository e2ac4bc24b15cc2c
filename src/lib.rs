//! Node process supervisor library.
//!
//! Starts a node's subsystems in a fixed, dependency-checked order, unwinds
//! on startup failure, and tears everything down in reverse order under a
//! shared grace deadline.

pub mod bridge;
pub mod config;
pub mod execution;
pub mod kernel;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;

pub use config::schema::NodeConfig;
pub use kernel::Kernel;
pub use lifecycle::{Shutdown, Supervisor};
