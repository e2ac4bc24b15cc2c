//! Info server: node status, chain summary, network listeners.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::net::ListenerRegistry;
use crate::rpc::service::{ChainSummary, NodeStatus, Service};

#[derive(Clone)]
pub struct InfoState {
    pub service: Arc<Service>,
    pub listeners: Arc<ListenerRegistry>,
}

#[derive(Debug, Serialize)]
pub struct NetworkListener {
    pub name: String,
    pub address: String,
}

pub fn router(state: InfoState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/chain", get(chain))
        .route("/network", get(network))
        .with_state(state)
}

async fn status(State(state): State<InfoState>) -> Json<NodeStatus> {
    Json(state.service.status())
}

async fn chain(State(state): State<InfoState>) -> Json<ChainSummary> {
    Json(state.service.chain())
}

async fn network(State(state): State<InfoState>) -> Json<Vec<NetworkListener>> {
    let listeners = state
        .listeners
        .names()
        .into_iter()
        .filter_map(|name| {
            let address = state.listeners.local_addr(&name)?.to_string();
            Some(NetworkListener { name, address })
        })
        .collect();
    Json(listeners)
}
