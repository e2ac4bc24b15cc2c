//! Boundary to the consensus engine.
//!
//! The engine itself lives outside this crate. The node only drives its
//! lifecycle and reads a few facts from it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::execution::transactor::TxError;
use crate::execution::types::Tx;
use crate::lifecycle::BoxError;

/// Height source backed by the consensus engine.
pub trait BlockStore: Send + Sync {
    fn height(&self) -> u64;
}

/// Identity the consensus node advertises on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub id: String,
    pub moniker: String,
    pub net_address: String,
    pub version: String,
}

/// A consensus node handle. `start`/`stop` drive it, `quit` resolves once it
/// has fully stopped, `close` releases its databases.
#[async_trait]
pub trait ConsensusNode: Send + Sync {
    async fn start(&self) -> Result<(), BoxError>;

    async fn stop(&self) -> Result<(), BoxError>;

    async fn quit(&self);

    fn close(&self);

    fn node_info(&self) -> NodeInfo;

    fn validator_address(&self) -> Option<String>;

    fn block_store(&self) -> Arc<dyn BlockStore>;

    /// Hand a transaction to the mempool for broadcast.
    async fn check_tx(&self, tx: Tx) -> Result<(), TxError>;
}

/// Read-only snapshot of the consensus node used by RPC services.
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub node_info: NodeInfo,
    pub validator_address: Option<String>,
}

impl NodeView {
    pub fn from_node(node: &dyn ConsensusNode) -> Self {
        Self {
            node_info: node.node_info(),
            validator_address: node.validator_address(),
        }
    }
}
