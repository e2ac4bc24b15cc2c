//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use node_supervisor::config::{NodeConfig, ServerConfig};
use node_supervisor::execution::{
    Block, BlockStore, Blockchain, ConsensusNode, GenesisDoc, MemoryStorage, NodeInfo, Storage, StorageError, Tx,
    TxError,
};
use node_supervisor::kernel::{Kernel, PreConsensusState};
use node_supervisor::lifecycle::{fatal_channel, BoxError, FatalError, Launcher, Process, Shutdown, ShutdownFn};

/// Ordered record of launch and shutdown events.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Launcher whose start and shutdown are recorded as `start:<name>` and
/// `stop:<name>`.
pub fn recording_launcher(name: &'static str, enabled: bool, journal: &Journal) -> Launcher {
    let journal = journal.clone();
    Launcher::new(name, enabled, move || async move {
        journal.push(format!("start:{name}"));
        let process = ShutdownFn::new(move |_ctx| async move {
            journal.push(format!("stop:{name}"));
            Ok::<_, BoxError>(())
        });
        Ok::<_, BoxError>(Box::new(process) as Box<dyn Process>)
    })
}

/// Launcher whose shutdown sleeps for `delay` before recording.
pub fn slow_launcher(name: &'static str, delay: Duration, journal: &Journal) -> Launcher {
    let journal = journal.clone();
    Launcher::new(name, true, move || async move {
        journal.push(format!("start:{name}"));
        let process = ShutdownFn::new(move |_ctx| async move {
            tokio::time::sleep(delay).await;
            journal.push(format!("stop:{name}"));
            Ok::<_, BoxError>(())
        });
        Ok::<_, BoxError>(Box::new(process) as Box<dyn Process>)
    })
}

/// Launcher whose start function fails.
pub fn failing_launcher(name: &'static str, journal: &Journal) -> Launcher {
    let journal = journal.clone();
    Launcher::new(name, true, move || async move {
        journal.push(format!("start:{name}"));
        Err::<Box<dyn Process>, BoxError>(format!("{name} could not start").into())
    })
}

/// Storage that counts `close` calls.
#[derive(Debug, Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    closes: AtomicUsize,
}

impl CountingStorage {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Storage for CountingStorage {
    fn put_block(&self, block: Block) -> Result<(), StorageError> {
        self.inner.put_block(block)
    }

    fn block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        self.inner.block(height)
    }

    fn close(&self) -> Result<(), StorageError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Consensus node double. `quit` resolves once `stop` has been called,
/// unless the node is configured to hang.
pub struct MockConsensus {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub closes: AtomicUsize,
    pub submitted: Mutex<Vec<Tx>>,
    hang_on_quit: AtomicBool,
    fail_start: AtomicBool,
    quit: watch::Sender<bool>,
}

impl MockConsensus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            hang_on_quit: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            quit: watch::channel(false).0,
        })
    }

    pub fn hanging() -> Arc<Self> {
        let node = Self::new();
        node.hang_on_quit.store(true, Ordering::SeqCst);
        node
    }

    /// A node whose `start` returns an error.
    pub fn failing_start() -> Arc<Self> {
        let node = Self::new();
        node.fail_start.store(true, Ordering::SeqCst);
        node
    }
}

struct FixedHeight(u64);

impl BlockStore for FixedHeight {
    fn height(&self) -> u64 {
        self.0
    }
}

#[async_trait]
impl ConsensusNode for MockConsensus {
    async fn start(&self) -> Result<(), BoxError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err("p2p switch failed to start".into());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if !self.hang_on_quit.load(Ordering::SeqCst) {
            self.quit.send_replace(true);
        }
        Ok(())
    }

    async fn quit(&self) {
        let mut rx = self.quit.subscribe();
        let _ = rx.wait_for(|quit| *quit).await;
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn node_info(&self) -> NodeInfo {
        NodeInfo {
            id: "node-0".into(),
            moniker: "mock".into(),
            net_address: "127.0.0.1:26656".into(),
            version: "0.0.0".into(),
        }
    }

    fn validator_address(&self) -> Option<String> {
        Some("VALIDATOR0".into())
    }

    fn block_store(&self) -> Arc<dyn BlockStore> {
        Arc::new(FixedHeight(42))
    }

    async fn check_tx(&self, tx: Tx) -> Result<(), TxError> {
        self.submitted.lock().unwrap().push(tx);
        Ok(())
    }
}

/// Config with every server on an ephemeral port and short timings.
pub fn test_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.timeout_factor = 0.05;
    config.rpc.profiler = ServerConfig::new(true, "0");
    config.rpc.web3 = ServerConfig::new(true, "0");
    config.rpc.info = ServerConfig::new(true, "0");
    config.rpc.query = ServerConfig::new(true, "0");
    config.rpc.metrics.enabled = true;
    config.rpc.metrics.listen_port = "0".into();
    config.lifecycle.shutdown_grace_secs = 5;
    config
}

/// Config with every optional launcher off.
pub fn quiet_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.rpc.web3.enabled = false;
    config.rpc.info.enabled = false;
    config.rpc.query.enabled = false;
    config.rpc.metrics.enabled = false;
    config.rpc.profiler.enabled = false;
    config.lifecycle.announce = false;
    config.bridge.enabled = false;
    config
}

pub struct TestKernel {
    pub kernel: Arc<Kernel>,
    pub storage: Arc<CountingStorage>,
    pub shutdown: Shutdown,
    pub fatal: tokio::sync::mpsc::UnboundedReceiver<FatalError>,
}

pub fn test_kernel(config: NodeConfig, node: Option<Arc<dyn ConsensusNode>>) -> TestKernel {
    let storage = Arc::new(CountingStorage::default());
    let shutdown = Shutdown::new();
    let (fatal_tx, fatal) = fatal_channel();
    let blockchain = Arc::new(Blockchain::new(GenesisDoc::new(&config.node.chain_id), 10));
    let pre = PreConsensusState {
        storage: storage.clone(),
        blockchain,
        key_store: None,
        fatal: fatal_tx,
        shutdown: shutdown.clone(),
        metrics: None,
    };
    TestKernel {
        kernel: Arc::new(Kernel::new(config, pre, node)),
        storage,
        shutdown,
        fatal,
    }
}
