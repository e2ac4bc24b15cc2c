//! Transactions, blocks and receipts.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A submitted transaction. The payload is opaque to the node core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    pub id: Uuid,
    pub payload: serde_json::Value,
}

impl Tx {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
        }
    }
}

/// A committed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    /// Seconds since the unix epoch.
    pub time: u64,
    pub txs: Vec<Tx>,
}

impl Block {
    pub fn new(height: u64, txs: Vec<Tx>) -> Self {
        Self {
            height,
            time: unix_now(),
            txs,
        }
    }
}

/// Returned to the submitter once a transaction has been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: Uuid,
    /// Chain height at the time of acceptance.
    pub height: u64,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
