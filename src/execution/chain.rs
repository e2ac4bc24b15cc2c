//! Read-mostly view of the chain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde::Serialize;

use crate::execution::consensus::BlockStore;
use crate::execution::types::unix_now;

/// Genesis parameters fixed at node construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    /// Seconds since the unix epoch.
    pub genesis_time: u64,
}

impl GenesisDoc {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            genesis_time: unix_now(),
        }
    }
}

/// Chain height and recent block times.
///
/// In local execution mode the block producer advances the height through
/// [`Blockchain::commit`]. In consensus mode the node's block store is
/// attached once and becomes the source of truth.
pub struct Blockchain {
    genesis: GenesisDoc,
    height: AtomicU64,
    block_store: OnceLock<Arc<dyn BlockStore>>,
    recent_block_times: Mutex<VecDeque<u64>>,
    sample_size: usize,
}

impl Blockchain {
    pub fn new(genesis: GenesisDoc, sample_size: usize) -> Self {
        Self {
            genesis,
            height: AtomicU64::new(0),
            block_store: OnceLock::new(),
            recent_block_times: Mutex::new(VecDeque::with_capacity(sample_size)),
            sample_size: sample_size.max(1),
        }
    }

    pub fn genesis(&self) -> &GenesisDoc {
        &self.genesis
    }

    pub fn chain_id(&self) -> &str {
        &self.genesis.chain_id
    }

    /// Attach the consensus node's block store. Only the first call wins.
    pub fn set_block_store(&self, store: Arc<dyn BlockStore>) -> bool {
        self.block_store.set(store).is_ok()
    }

    pub fn height(&self) -> u64 {
        match self.block_store.get() {
            Some(store) => store.height(),
            None => self.height.load(Ordering::SeqCst),
        }
    }

    /// Record a locally committed block.
    pub fn commit(&self, height: u64, time: u64) {
        self.height.store(height, Ordering::SeqCst);
        let mut times = self
            .recent_block_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if times.len() == self.sample_size {
            times.pop_front();
        }
        times.push_back(time);
    }

    /// Mean seconds between the sampled blocks, if at least two were seen.
    pub fn average_block_interval(&self) -> Option<f64> {
        let times = self
            .recent_block_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (first, last) = (times.front()?, times.back()?);
        if times.len() < 2 {
            return None;
        }
        Some(last.saturating_sub(*first) as f64 / (times.len() - 1) as f64)
    }
}

impl std::fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockchain")
            .field("chain_id", &self.genesis.chain_id)
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStore(u64);

    impl BlockStore for FixedStore {
        fn height(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn commit_advances_height_and_samples() {
        let chain = Blockchain::new(GenesisDoc::new("test"), 3);
        assert_eq!(chain.average_block_interval(), None);

        chain.commit(1, 100);
        chain.commit(2, 102);
        chain.commit(3, 104);
        chain.commit(4, 110);
        assert_eq!(chain.height(), 4);
        // Samples are 102, 104, 110.
        assert_eq!(chain.average_block_interval(), Some(4.0));
    }

    #[test]
    fn block_store_takes_over() {
        let chain = Blockchain::new(GenesisDoc::new("test"), 10);
        chain.commit(1, 1);
        assert!(chain.set_block_store(Arc::new(FixedStore(42))));
        assert!(!chain.set_block_store(Arc::new(FixedStore(7))));
        assert_eq!(chain.height(), 42);
    }
}
