//! Execution-side collaborators consumed by the launchers.
//!
//! # Data Flow
//! ```text
//! Local mode:     Transactor ─ CheckTx::Local ─▶ LocalExecution ─▶ Storage + Blockchain
//! Consensus mode: Transactor ─ CheckTx::Mempool ─▶ ConsensusNode ─▶ BlockStore ─▶ Blockchain
//! ```
//!
//! Storage, the consensus engine and the key store are narrow interfaces;
//! the in-crate implementations are the ones the node binary runs with.

pub mod chain;
pub mod consensus;
pub mod keys;
pub mod local;
pub mod storage;
pub mod transactor;
pub mod types;

pub use chain::{Blockchain, GenesisDoc};
pub use consensus::{BlockStore, ConsensusNode, NodeInfo, NodeView};
pub use keys::{KeyInfo, KeyStore, KeyStoreError};
pub use local::LocalExecution;
pub use storage::{MemoryStorage, Storage, StorageError};
pub use transactor::{CheckTx, Transactor, TxError};
pub use types::{Block, Tx, TxReceipt};
