//! Transaction submission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::execution::chain::Blockchain;
use crate::execution::consensus::ConsensusNode;
use crate::execution::types::{Tx, TxReceipt};
use crate::observability::metrics;

/// Errors from transaction submission.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("transaction pool is closed")]
    PoolClosed,
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("invalid transaction: {0}")]
    Invalid(String),
}

/// Where accepted transactions go.
pub enum CheckTx {
    /// Committed by the local block producer.
    Local(mpsc::UnboundedSender<Tx>),
    /// Broadcast through the consensus node's mempool.
    Mempool(Arc<dyn ConsensusNode>),
}

/// Entry point for submitting transactions.
pub struct Transactor {
    blockchain: Arc<Blockchain>,
    check_tx: CheckTx,
    submitted: AtomicU64,
}

impl Transactor {
    pub fn new(blockchain: Arc<Blockchain>, check_tx: CheckTx) -> Self {
        Self {
            blockchain,
            check_tx,
            submitted: AtomicU64::new(0),
        }
    }

    pub async fn broadcast(&self, tx: Tx) -> Result<TxReceipt, TxError> {
        if tx.payload.is_null() {
            return Err(TxError::Invalid("empty payload".to_string()));
        }
        let tx_id = tx.id;
        match &self.check_tx {
            CheckTx::Local(pool) => pool.send(tx).map_err(|_| TxError::PoolClosed)?,
            CheckTx::Mempool(node) => node.check_tx(tx).await?,
        }

        self.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::record_tx_submitted();
        tracing::debug!(tx_id = %tx_id, "Transaction accepted");
        Ok(TxReceipt {
            tx_id,
            height: self.blockchain.height(),
        })
    }

    /// Transactions accepted since startup.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Transactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.check_tx {
            CheckTx::Local(_) => "local",
            CheckTx::Mempool(_) => "mempool",
        };
        f.debug_struct("Transactor")
            .field("mode", &mode)
            .field("submitted", &self.submitted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::chain::GenesisDoc;

    fn chain() -> Arc<Blockchain> {
        Arc::new(Blockchain::new(GenesisDoc::new("test"), 10))
    }

    #[tokio::test]
    async fn local_pool_receives_tx() {
        let (tx_pool, mut rx) = mpsc::unbounded_channel();
        let transactor = Transactor::new(chain(), CheckTx::Local(tx_pool));

        let receipt = transactor
            .broadcast(Tx::new(serde_json::json!({"op": "noop"})))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().id, receipt.tx_id);
        assert_eq!(transactor.submitted(), 1);
    }

    #[tokio::test]
    async fn closed_pool_is_error() {
        let (tx_pool, rx) = mpsc::unbounded_channel();
        drop(rx);
        let transactor = Transactor::new(chain(), CheckTx::Local(tx_pool));
        let err = transactor
            .broadcast(Tx::new(serde_json::json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::PoolClosed));
    }

    #[tokio::test]
    async fn null_payload_rejected() {
        let (tx_pool, _rx) = mpsc::unbounded_channel();
        let transactor = Transactor::new(chain(), CheckTx::Local(tx_pool));
        assert!(matches!(
            transactor.broadcast(Tx::new(serde_json::Value::Null)).await,
            Err(TxError::Invalid(_))
        ));
    }
}
