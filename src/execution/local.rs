//! Local block production for running without consensus.
//!
//! Every accepted transaction is valid; a block containing whatever arrived
//! since the previous tick is committed every `block_duration`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::execution::chain::Blockchain;
use crate::execution::storage::Storage;
use crate::execution::types::{Block, Tx};
use crate::lifecycle::process::{stopped, TaskProcess};
use crate::lifecycle::{BoxError, FatalSender};
use crate::observability::metrics;

/// Everything the block producer needs.
pub struct LocalExecution {
    pub name: String,
    pub storage: Arc<dyn Storage>,
    pub blockchain: Arc<Blockchain>,
    pub block_duration: Duration,
    pub fatal: FatalSender,
}

impl LocalExecution {
    /// Spawn the producer. Returns its process handle and the sending side of
    /// its transaction pool.
    pub fn spawn(self) -> (TaskProcess, mpsc::UnboundedSender<Tx>) {
        let (pool_tx, pool_rx) = mpsc::unbounded_channel();
        let name = self.name.clone();
        let process = TaskProcess::spawn(name, move |stop| self.run(pool_rx, stop));
        (process, pool_tx)
    }

    async fn run(
        self,
        mut pool: mpsc::UnboundedReceiver<Tx>,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), BoxError> {
        tracing::info!(
            process = %self.name,
            block_ms = self.block_duration.as_millis() as u64,
            "Local block production starting"
        );

        let mut ticker = tokio::time::interval(self.block_duration);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut pending = Vec::new();

        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                Some(tx) = pool.recv() => pending.push(tx),
                _ = ticker.tick() => self.commit(std::mem::take(&mut pending))?,
            }
        }

        // Drain what was accepted before the stop request.
        pool.close();
        while let Ok(tx) = pool.try_recv() {
            pending.push(tx);
        }
        if !pending.is_empty() {
            self.commit(pending)?;
        }
        tracing::info!(process = %self.name, height = self.blockchain.height(), "Local block production stopped");
        Ok(())
    }

    fn commit(&self, txs: Vec<Tx>) -> Result<(), BoxError> {
        let height = self.blockchain.height() + 1;
        let block = Block::new(height, txs);
        let time = block.time;
        let tx_count = block.txs.len();

        if let Err(e) = self.storage.put_block(block) {
            self.fatal.report(&self.name, &e);
            return Err(Box::new(e));
        }
        self.blockchain.commit(height, time);
        metrics::set_block_height(height);
        tracing::debug!(process = %self.name, height, txs = tx_count, "Block committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::chain::GenesisDoc;
    use crate::execution::storage::MemoryStorage;
    use crate::lifecycle::process::{Process, ShutdownContext};
    use crate::lifecycle::shutdown::fatal_channel;

    fn producer(storage: Arc<MemoryStorage>, fatal: FatalSender) -> (LocalExecution, Arc<Blockchain>) {
        let blockchain = Arc::new(Blockchain::new(GenesisDoc::new("test"), 10));
        let exec = LocalExecution {
            name: "NoConsensusExecution".into(),
            storage,
            blockchain: blockchain.clone(),
            block_duration: Duration::from_secs(1),
            fatal,
        };
        (exec, blockchain)
    }

    #[tokio::test(start_paused = true)]
    async fn commits_blocks_on_tick() {
        let storage = Arc::new(MemoryStorage::new());
        let (fatal, _fatal_rx) = fatal_channel();
        let (exec, blockchain) = producer(storage.clone(), fatal);
        let (mut process, pool) = exec.spawn();

        pool.send(Tx::new(serde_json::json!({"n": 1}))).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(blockchain.height(), 1);
        assert_eq!(storage.block(1).unwrap().unwrap().txs.len(), 1);

        process
            .shutdown(ShutdownContext::with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drains_pool_on_stop() {
        let storage = Arc::new(MemoryStorage::new());
        let (fatal, _fatal_rx) = fatal_channel();
        let (exec, blockchain) = producer(storage.clone(), fatal);
        let (mut process, pool) = exec.spawn();
        tokio::task::yield_now().await;

        pool.send(Tx::new(serde_json::json!({"n": 2}))).unwrap();
        process
            .shutdown(ShutdownContext::with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(blockchain.height(), 1);
        assert!(pool.send(Tx::new(serde_json::json!({"n": 3}))).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_is_fatal() {
        let storage = Arc::new(MemoryStorage::new());
        storage.close().unwrap();
        let (fatal, mut fatal_rx) = fatal_channel();
        let (exec, _blockchain) = producer(storage, fatal);
        let (mut process, _pool) = exec.spawn();

        let report = fatal_rx.recv().await.unwrap();
        assert_eq!(report.process, "NoConsensusExecution");
        assert!(process
            .shutdown(ShutdownContext::with_timeout(Duration::from_secs(1)))
            .await
            .is_err());
    }
}
