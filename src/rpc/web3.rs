//! Web3 JSON-RPC server.
//!
//! Supports the handful of `eth_`, `net_` and `web3_` methods a wallet needs
//! to identify the chain and submit transactions.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rpc::service::EthService;

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SERVER_ERROR: i64 = -32000;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

pub fn router(eth: Arc<EthService>) -> Router {
    Router::new().route("/", post(handle)).with_state(eth)
}

async fn handle(State(eth): State<Arc<EthService>>, Json(request): Json<RpcRequest>) -> Json<RpcResponse> {
    Json(dispatch(&eth, request).await)
}

/// Execute one JSON-RPC call.
pub async fn dispatch(eth: &EthService, request: RpcRequest) -> RpcResponse {
    let id = request.id;
    match request.method.as_str() {
        "web3_clientVersion" => RpcResponse::result(
            id,
            Value::String(format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))),
        ),
        "net_version" => RpcResponse::result(id, Value::String(eth.chain_id().to_string())),
        "eth_chainId" => RpcResponse::result(id, Value::String(format!("{:#x}", eth.chain_id()))),
        "eth_blockNumber" => RpcResponse::result(id, Value::String(format!("{:#x}", eth.block_number()))),
        "eth_accounts" => RpcResponse::result(id, serde_json::json!(eth.accounts())),
        "eth_sendTransaction" => {
            let Some(tx) = request.params.get(0).filter(|tx| tx.is_object()).cloned() else {
                return RpcResponse::error(id, INVALID_PARAMS, "expected a transaction object");
            };
            match eth.send_transaction(tx).await {
                Ok(receipt) => RpcResponse::result(id, Value::String(receipt.tx_id.to_string())),
                Err(e) => RpcResponse::error(id, SERVER_ERROR, e.to_string()),
            }
        }
        other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("method {other} not supported")),
    }
}
