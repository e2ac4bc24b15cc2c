//! Bridge to an external ledger.
//!
//! # Data Flow
//! ```text
//! Lifecycle:
//!     Bridges launcher → BridgeProcess::launch → BridgeAdapter::start
//!         → BridgeControl (HTTP POST {verb, flush, stream})
//!     Shutdown → flushing stop → forced stop only if that failed
//!
//! Operations:
//!     POST /bridge/ops on rpc/query → LedgerOp → BridgeRequest → BridgeEnvelope
//!         → Transactor
//! ```
//!
//! # Design Decisions
//! - Stop is idempotent; stopping a bridge that never started is success
//! - Start, stop and forced-stop failures are distinct error variants
//! - Ledger operations are validated into a typed envelope before submission

pub mod adapter;
pub mod control;
pub mod error;
pub mod ops;

pub use adapter::{BridgeAdapter, BridgeProcess, BridgeRunning, BridgeStopped};
pub use control::{BridgeControl, BridgeFlags, BridgeStatus, BridgeVerb, HttpBridgeControl};
pub use error::BridgeError;
pub use ops::{Amount, BridgeEnvelope, BridgeRequest, LedgerBlock, LedgerOp};
