//! Shared kernel state, grouped by the stage that writes it.
//!
//! `PreConsensusState` is complete before the first launcher runs.
//! `PostConsensusState` is a set of write-once cells filled by whichever
//! execution launcher is enabled. Reading a cell nobody wrote is an error,
//! not a panic, so a disabled launcher can never leave a later one reading
//! garbage.

use std::fmt;
use std::sync::{Arc, OnceLock};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::execution::{Blockchain, KeyStore, NodeView, Storage, Transactor};
use crate::lifecycle::{FatalSender, LifecycleError, Shutdown};
use crate::rpc::service::{EthService, Service};

/// Names a piece of kernel state for dependency declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateTag {
    Storage,
    Blockchain,
    KeyStore,
    Transactor,
    Service,
    EthService,
    NodeView,
}

impl StateTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateTag::Storage => "storage",
            StateTag::Blockchain => "blockchain",
            StateTag::KeyStore => "key_store",
            StateTag::Transactor => "transactor",
            StateTag::Service => "service",
            StateTag::EthService => "eth_service",
            StateTag::NodeView => "node_view",
        }
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cell written at most once.
pub struct WriteOnce<T> {
    tag: StateTag,
    cell: OnceLock<T>,
}

impl<T> WriteOnce<T> {
    pub fn new(tag: StateTag) -> Self {
        Self {
            tag,
            cell: OnceLock::new(),
        }
    }

    pub fn set(&self, value: T) -> Result<(), LifecycleError> {
        self.cell
            .set(value)
            .map_err(|_| LifecycleError::StateAlreadySet(self.tag))
    }

    pub fn get(&self) -> Result<&T, LifecycleError> {
        self.cell.get().ok_or(LifecycleError::StateUnset(self.tag))
    }

    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> fmt::Debug for WriteOnce<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteOnce")
            .field("tag", &self.tag)
            .field("set", &self.is_set())
            .finish()
    }
}

/// State available before any launcher runs.
pub struct PreConsensusState {
    pub storage: Arc<dyn Storage>,
    pub blockchain: Arc<Blockchain>,
    pub key_store: Option<Arc<KeyStore>>,
    pub fatal: FatalSender,
    pub shutdown: Shutdown,
    pub metrics: Option<PrometheusHandle>,
}

impl PreConsensusState {
    /// Tags this stage always provides.
    pub fn provided(&self) -> Vec<StateTag> {
        let mut tags = vec![StateTag::Storage, StateTag::Blockchain];
        if self.key_store.is_some() {
            tags.push(StateTag::KeyStore);
        }
        tags
    }
}

/// State written by the execution stage.
#[derive(Debug)]
pub struct PostConsensusState {
    pub transactor: WriteOnce<Arc<Transactor>>,
    pub service: WriteOnce<Arc<Service>>,
    pub eth_service: WriteOnce<Arc<EthService>>,
    pub node_view: WriteOnce<NodeView>,
}

impl Default for PostConsensusState {
    fn default() -> Self {
        Self {
            transactor: WriteOnce::new(StateTag::Transactor),
            service: WriteOnce::new(StateTag::Service),
            eth_service: WriteOnce::new(StateTag::EthService),
            node_view: WriteOnce::new(StateTag::NodeView),
        }
    }
}
