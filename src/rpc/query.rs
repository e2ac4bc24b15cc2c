//! Query server: JSON API for blocks, transactions, keys and bridged
//! ledger operations.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeEnvelope, BridgeRequest, LedgerBlock};
use crate::config::KeysConfig;
use crate::execution::{Block, KeyInfo, KeyStore, KeyStoreError, StorageError, TxError, TxReceipt};
use crate::observability::metrics;
use crate::rpc::service::Service;
use crate::rpc::ApiError;

#[derive(Clone)]
pub struct QueryState {
    pub service: Arc<Service>,
    pub keys: KeysConfig,
    pub key_store: Option<Arc<KeyStore>>,
}

impl QueryState {
    /// The kernel's key store, or one opened from config on demand.
    fn key_store(&self) -> Result<Arc<KeyStore>, ApiError> {
        if !self.keys.service_enabled {
            return Err(ApiError::not_found("key service is disabled"));
        }
        Ok(self
            .key_store
            .clone()
            .unwrap_or_else(|| Arc::new(KeyStore::from_config(&self.keys))))
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactRequest {
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct AcceptedOp {
    pub index: usize,
    pub key: String,
    pub tx_id: uuid::Uuid,
}

#[derive(Debug, Serialize)]
pub struct RejectedOp {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct BridgeOpsResult {
    pub accepted: Vec<AcceptedOp>,
    pub rejected: Vec<RejectedOp>,
}

pub fn router(state: QueryState) -> Router {
    Router::new()
        .route("/blocks/{height}", get(block))
        .route("/transact", post(transact))
        .route("/keys", get(list_keys))
        .route("/keys/{name}", get(get_key))
        .route("/bridge/ops", post(bridge_ops))
        .with_state(state)
}

impl From<TxError> for ApiError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::PoolClosed => ApiError::unavailable(e.to_string()),
            TxError::Rejected(_) | TxError::Invalid(_) => ApiError::bad_request(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Closed => ApiError::unavailable(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<KeyStoreError> for ApiError {
    fn from(e: KeyStoreError) -> Self {
        match e {
            KeyStoreError::InvalidName(_) => ApiError::bad_request(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

async fn block(State(state): State<QueryState>, Path(height): Path<u64>) -> Result<Json<Block>, ApiError> {
    state
        .service
        .block(height)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no block at height {height}")))
}

async fn transact(
    State(state): State<QueryState>,
    Json(request): Json<TransactRequest>,
) -> Result<Json<TxReceipt>, ApiError> {
    Ok(Json(state.service.transact(request.payload).await?))
}

async fn list_keys(State(state): State<QueryState>) -> Result<Json<Vec<KeyInfo>>, ApiError> {
    let store = state.key_store()?;
    Ok(Json(store.list()?))
}

async fn get_key(State(state): State<QueryState>, Path(name): Path<String>) -> Result<Json<KeyInfo>, ApiError> {
    let store = state.key_store()?;
    store
        .get(&name)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no key named {name}")))
}

/// Validate each operation and submit the valid ones. Invalid operations are
/// reported per index and do not block the rest of the batch.
async fn bridge_ops(State(state): State<QueryState>, Json(batch): Json<LedgerBlock>) -> Json<BridgeOpsResult> {
    let mut result = BridgeOpsResult::default();

    for (index, op) in batch.ops.into_iter().enumerate() {
        let envelope = match BridgeRequest::try_from(op) {
            Ok(request) => BridgeEnvelope::new(batch.block, request),
            Err(e) => {
                tracing::debug!(block = batch.block, index, error = %e, "Bridge operation rejected");
                result.rejected.push(RejectedOp {
                    index,
                    error: e.to_string(),
                });
                continue;
            }
        };

        match state.service.transact(envelope.to_payload()).await {
            Ok(receipt) => {
                metrics::record_bridge_op(&envelope.key);
                result.accepted.push(AcceptedOp {
                    index,
                    key: envelope.key,
                    tx_id: receipt.tx_id,
                });
            }
            Err(e) => result.rejected.push(RejectedOp {
                index,
                error: e.to_string(),
            }),
        }
    }

    Json(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Blockchain, CheckTx, GenesisDoc, MemoryStorage, Storage, Transactor, Tx};
    use crate::net::ListenerRegistry;
    use crate::rpc::launch_server;

    struct Fixture {
        base: String,
        pool: tokio::sync::mpsc::UnboundedReceiver<Tx>,
        _server: crate::rpc::ServerProcess,
        _registry: ListenerRegistry,
    }

    async fn fixture(keys: KeysConfig) -> Fixture {
        let blockchain = Arc::new(Blockchain::new(GenesisDoc::new("test"), 10));
        let storage = Arc::new(MemoryStorage::new());
        storage.put_block(Block::new(1, vec![])).unwrap();
        let (pool_tx, pool) = tokio::sync::mpsc::unbounded_channel();
        let transactor = Arc::new(Transactor::new(blockchain.clone(), CheckTx::Local(pool_tx)));
        let service = Arc::new(Service::new("n", blockchain, storage, transactor));

        let registry = ListenerRegistry::new();
        let state = QueryState {
            service,
            keys,
            key_store: None,
        };
        let server = launch_server("rpc/query", "127.0.0.1:0", &registry, router(state))
            .await
            .unwrap();
        Fixture {
            base: format!("http://{}", server.local_addr()),
            pool,
            _server: server,
            _registry: registry,
        }
    }

    #[tokio::test]
    async fn block_lookup() {
        let f = fixture(KeysConfig::default()).await;
        let found = reqwest::get(format!("{}/blocks/1", f.base)).await.unwrap();
        assert!(found.status().is_success());
        let missing = reqwest::get(format!("{}/blocks/9", f.base)).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn keys_disabled_by_default() {
        let f = fixture(KeysConfig::default()).await;
        let response = reqwest::get(format!("{}/keys", f.base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn keys_opened_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeysConfig {
            service_enabled: true,
            directory: dir.path().to_string_lossy().into_owned(),
            allow_bad_file_permissions: true,
        };
        std::fs::write(dir.path().join("val.json"), r#"{"address": "ABC", "curve": "ed25519"}"#).unwrap();

        let f = fixture(keys).await;
        let listed: Vec<serde_json::Value> = reqwest::get(format!("{}/keys", f.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed[0]["name"], "val");

        let found = reqwest::get(format!("{}/keys/val", f.base)).await.unwrap();
        assert_eq!(found.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn key_lookup_stays_inside_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("keys");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(root.path().join("secret.json"), r#"{"address": "OUTSIDE", "curve": "ed25519"}"#).unwrap();
        let keys = KeysConfig {
            service_enabled: true,
            directory: dir.to_string_lossy().into_owned(),
            allow_bad_file_permissions: true,
        };

        let f = fixture(keys).await;
        let response = reqwest::get(format!("{}/keys/..%2Fsecret", f.base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body = response.text().await.unwrap();
        assert!(!body.contains("OUTSIDE"));
    }

    #[tokio::test]
    async fn bridge_ops_partially_accepted() {
        let mut f = fixture(KeysConfig::default()).await;
        let result: serde_json::Value = reqwest::Client::new()
            .post(format!("{}/bridge/ops", f.base))
            .json(&serde_json::json!({
                "block": 12,
                "ops": [
                    {"type": "transfer", "value": {"from": "alice", "to": "bob", "amount": "1.000 HIVE"}},
                    {"type": "transfer", "value": {"from": "alice", "to": "bob", "amount": "lots"}}
                ]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(result["accepted"][0]["key"], "transfer");
        assert_eq!(result["rejected"][0]["index"], 1);
        let tx = f.pool.recv().await.unwrap();
        assert_eq!(tx.payload["bridge"]["source_block"], 12);
    }
}
