//! Read and submit operations shared by the RPC servers.

use std::sync::Arc;

use serde::Serialize;

use crate::execution::{
    Block, Blockchain, KeyInfo, KeyStore, KeyStoreError, NodeInfo, NodeView, Storage, StorageError, Transactor,
    Tx, TxError, TxReceipt,
};

/// Node status as reported by `rpc/info`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub moniker: String,
    pub chain_id: String,
    pub height: u64,
    pub node_info: Option<NodeInfo>,
    pub validator_address: Option<String>,
    pub version: &'static str,
}

/// Chain facts as reported by `rpc/info`.
#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    pub chain_id: String,
    pub genesis_time: u64,
    pub height: u64,
    pub average_block_interval_secs: Option<f64>,
}

/// General node service.
pub struct Service {
    moniker: String,
    blockchain: Arc<Blockchain>,
    storage: Arc<dyn Storage>,
    transactor: Arc<Transactor>,
    node_view: Option<NodeView>,
    key_store: Option<Arc<KeyStore>>,
}

impl Service {
    pub fn new(
        moniker: impl Into<String>,
        blockchain: Arc<Blockchain>,
        storage: Arc<dyn Storage>,
        transactor: Arc<Transactor>,
    ) -> Self {
        Self {
            moniker: moniker.into(),
            blockchain,
            storage,
            transactor,
            node_view: None,
            key_store: None,
        }
    }

    pub fn with_node_view(mut self, view: NodeView) -> Self {
        self.node_view = Some(view);
        self
    }

    pub fn with_key_store(mut self, key_store: Option<Arc<KeyStore>>) -> Self {
        self.key_store = key_store;
        self
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            moniker: self.moniker.clone(),
            chain_id: self.blockchain.chain_id().to_string(),
            height: self.blockchain.height(),
            node_info: self.node_view.as_ref().map(|v| v.node_info.clone()),
            validator_address: self.node_view.as_ref().and_then(|v| v.validator_address.clone()),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn chain(&self) -> ChainSummary {
        let genesis = self.blockchain.genesis();
        ChainSummary {
            chain_id: genesis.chain_id.clone(),
            genesis_time: genesis.genesis_time,
            height: self.blockchain.height(),
            average_block_interval_secs: self.blockchain.average_block_interval(),
        }
    }

    pub fn block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        self.storage.block(height)
    }

    pub async fn transact(&self, payload: serde_json::Value) -> Result<TxReceipt, TxError> {
        self.transactor.broadcast(Tx::new(payload)).await
    }

    /// Keys known to the kernel's key store, if it has one.
    pub fn keys(&self) -> Option<Result<Vec<KeyInfo>, KeyStoreError>> {
        self.key_store.as_ref().map(|store| store.list())
    }

    pub fn blockchain(&self) -> &Arc<Blockchain> {
        &self.blockchain
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("moniker", &self.moniker)
            .field("chain_id", &self.blockchain.chain_id())
            .finish()
    }
}

/// Ethereum-flavoured view of the same node.
#[derive(Debug)]
pub struct EthService {
    service: Arc<Service>,
    chain_id: u64,
}

impl EthService {
    pub fn new(service: Arc<Service>) -> Self {
        let chain_id = numeric_chain_id(service.blockchain().chain_id());
        Self { service, chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn block_number(&self) -> u64 {
        self.service.blockchain().height()
    }

    pub fn accounts(&self) -> Vec<String> {
        match self.service.keys() {
            Some(Ok(keys)) => keys.into_iter().map(|k| k.address).collect(),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Failed to list accounts");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub async fn send_transaction(&self, payload: serde_json::Value) -> Result<TxReceipt, TxError> {
        self.service.transact(payload).await
    }
}

/// Derive a stable numeric chain id from a string one. Numeric ids pass through.
pub fn numeric_chain_id(chain_id: &str) -> u64 {
    if let Ok(id) = chain_id.parse::<u64>() {
        return id;
    }
    // FNV-1a, truncated to 32 bits to stay inside JSON-safe integers.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in chain_id.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash & 0xffff_ffff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{CheckTx, GenesisDoc, MemoryStorage};
    use tokio::sync::mpsc;

    fn service() -> (Service, mpsc::UnboundedReceiver<Tx>) {
        let blockchain = Arc::new(Blockchain::new(GenesisDoc::new("test-chain"), 10));
        let (pool, rx) = mpsc::unbounded_channel();
        let transactor = Arc::new(Transactor::new(blockchain.clone(), CheckTx::Local(pool)));
        let service = Service::new("node-a", blockchain, Arc::new(MemoryStorage::new()), transactor);
        (service, rx)
    }

    #[tokio::test]
    async fn transact_reaches_pool() {
        let (service, mut rx) = service();
        let receipt = service.transact(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().id, receipt.tx_id);
        assert_eq!(service.status().moniker, "node-a");
        assert!(service.keys().is_none());
    }

    #[test]
    fn chain_id_numeric_passthrough() {
        assert_eq!(numeric_chain_id("1337"), 1337);
        assert_eq!(numeric_chain_id("test-chain"), numeric_chain_id("test-chain"));
        assert!(numeric_chain_id("test-chain") <= u64::from(u32::MAX));
    }
}
