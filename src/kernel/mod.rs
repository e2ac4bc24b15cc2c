//! The node kernel: configuration, shared state and the launch table.
//!
//! # Data Flow
//! ```text
//! NodeConfig ─▶ Kernel::from_config ─▶ PreConsensusState (storage, chain, keys)
//!                     │
//!                     ▼
//!     default_process_launchers ─▶ check_dependencies ─▶ Supervisor::start
//!                                                             │
//!                     execution launcher fills PostConsensusState
//!                     network launchers read it and register listeners
//! ```
//!
//! # Design Decisions
//! - State is grouped by the stage that writes it; post-consensus fields are write-once
//! - Dependencies between launchers are declared and checked before anything starts
//! - The kernel owns the listener registry the supervisor closes during shutdown

pub mod launchers;
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::{validate_config, NodeConfig};
use crate::execution::{Blockchain, ConsensusNode, GenesisDoc, KeyStore, MemoryStorage, NodeView};
use crate::lifecycle::{check_dependencies, FatalSender, Launcher, LifecycleError, Shutdown, Supervisor, SupervisorSettings};
use crate::net::ListenerRegistry;

pub use launchers::default_process_launchers;
pub use state::{PostConsensusState, PreConsensusState, StateTag, WriteOnce};

/// Everything the launchers share.
pub struct Kernel {
    pub config: NodeConfig,
    pub pre: PreConsensusState,
    pub post: PostConsensusState,
    /// Present when the node runs under consensus.
    pub node: Option<Arc<dyn ConsensusNode>>,
    pub listeners: Arc<ListenerRegistry>,
    started: Instant,
}

impl Kernel {
    pub fn new(config: NodeConfig, pre: PreConsensusState, node: Option<Arc<dyn ConsensusNode>>) -> Self {
        Self {
            config,
            pre,
            post: PostConsensusState::default(),
            node,
            listeners: Arc::new(ListenerRegistry::new()),
            started: Instant::now(),
        }
    }

    /// Build a kernel with in-memory storage and no consensus node.
    pub fn from_config(
        config: NodeConfig,
        shutdown: Shutdown,
        fatal: FatalSender,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let genesis = GenesisDoc::new(&config.node.chain_id);
        let blockchain = Arc::new(Blockchain::new(genesis, config.rpc.metrics.block_sample_size));
        let key_store = config
            .keys
            .service_enabled
            .then(|| Arc::new(KeyStore::from_config(&config.keys)));

        let pre = PreConsensusState {
            storage: Arc::new(MemoryStorage::new()),
            blockchain,
            key_store,
            fatal,
            shutdown,
            metrics,
        };
        Self::new(config, pre, None)
    }

    /// Attach a consensus node. Selects consensus mode in the launch table.
    pub fn with_consensus(mut self, node: Arc<dyn ConsensusNode>) -> Self {
        self.node = Some(node);
        self
    }

    pub fn node_view(&self) -> Result<&NodeView, LifecycleError> {
        self.post.node_view.get()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// The launch table for this kernel's configuration.
    pub fn launchers(self: &Arc<Self>) -> Vec<Launcher> {
        default_process_launchers(self.clone())
    }

    /// Validate configuration and dependencies, then start `launchers` under
    /// a new supervisor.
    pub async fn boot(&self, launchers: Vec<Launcher>) -> Result<Supervisor, LifecycleError> {
        validate_config(&self.config).map_err(LifecycleError::Configuration)?;
        check_dependencies(&launchers, &self.pre.provided())?;

        let mut supervisor = Supervisor::new(self.listeners.clone(), SupervisorSettings::from(&self.config.lifecycle));
        supervisor.start(launchers).await?;
        Ok(supervisor)
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("chain_id", &self.config.node.chain_id)
            .field("consensus", &self.node.is_some())
            .field("post", &self.post)
            .finish_non_exhaustive()
    }
}
