//! Block storage.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::execution::types::Block;

/// Errors from the storage collaborator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage is closed")]
    Closed,
    #[error("block {0} already stored")]
    DuplicateBlock(u64),
}

/// Persistent storage handle owned by the kernel and closed by the
/// `Database` process.
pub trait Storage: Send + Sync + fmt::Debug {
    fn put_block(&self, block: Block) -> Result<(), StorageError>;

    fn block(&self, height: u64) -> Result<Option<Block>, StorageError>;

    /// Release the handle. Later calls are no-ops.
    fn close(&self) -> Result<(), StorageError>;

    fn is_closed(&self) -> bool;
}

/// In-memory block storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blocks: DashMap<u64, Block>,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn put_block(&self, block: Block) -> Result<(), StorageError> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        match self.blocks.entry(block.height) {
            Entry::Occupied(_) => Err(StorageError::DuplicateBlock(block.height)),
            Entry::Vacant(slot) => {
                slot.insert(block);
                Ok(())
            }
        }
    }

    fn block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(self.blocks.get(&height).map(|b| b.value().clone()))
    }

    fn close(&self) -> Result<(), StorageError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(blocks = self.blocks.len(), "Storage closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
