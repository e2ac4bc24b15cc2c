//! The node's launch table.
//!
//! Order is fixed: storage first, then exactly one execution mode, then the
//! announcer, then network servers, then the bridge. Each launcher declares
//! the kernel state it reads and writes so the order can be checked.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bridge::{BridgeAdapter, BridgeProcess, HttpBridgeControl};
use crate::execution::{CheckTx, ConsensusNode, LocalExecution, NodeView, Transactor};
use crate::kernel::state::StateTag;
use crate::kernel::Kernel;
use crate::lifecycle::process::DeadlineExceeded;
use crate::lifecycle::{BoxError, Launcher, Process, ShutdownContext, ShutdownFn};
use crate::observability::metrics::detached_handle;
use crate::rpc::service::{EthService, Service};
use crate::rpc::{self, debug, info, launch_server, query, web3};

pub const PROFILING_PROCESS_NAME: &str = "Profiling";
pub const DATABASE_PROCESS_NAME: &str = "Database";
pub const NO_CONSENSUS_PROCESS_NAME: &str = "NoConsensusExecution";
pub const CONSENSUS_PROCESS_NAME: &str = "Consensus";
pub const STARTUP_PROCESS_NAME: &str = "StartupAnnouncer";
pub const WEB3_PROCESS_NAME: &str = "rpc/web3";
pub const INFO_PROCESS_NAME: &str = "rpc/info";
pub const METRICS_PROCESS_NAME: &str = "rpc/metrics";
pub const QUERY_PROCESS_NAME: &str = "rpc/query";
pub const BRIDGE_PROCESS_NAME: &str = "Bridges";

/// Execution-stage outputs, written by whichever execution launcher runs.
const EXECUTION_OUTPUTS: [StateTag; 3] = [StateTag::Transactor, StateTag::Service, StateTag::EthService];

pub fn default_process_launchers(kernel: Arc<Kernel>) -> Vec<Launcher> {
    vec![
        profile_launcher(kernel.clone()),
        database_launcher(kernel.clone()),
        no_consensus_launcher(kernel.clone()),
        consensus_launcher(kernel.clone()),
        startup_launcher(kernel.clone()),
        web3_launcher(kernel.clone()),
        info_launcher(kernel.clone()),
        metrics_launcher(kernel.clone()),
        query_launcher(kernel.clone()),
        bridge_launcher(kernel),
    ]
}

fn started<P: Process + 'static>(process: P) -> Result<Box<dyn Process>, BoxError> {
    Ok(Box::new(process))
}

pub fn profile_launcher(kernel: Arc<Kernel>) -> Launcher {
    let conf = kernel.config.rpc.profiler.clone();
    Launcher::new(PROFILING_PROCESS_NAME, conf.enabled, move || async move {
        let state = debug::DebugState {
            started: kernel.started(),
            shutdown: kernel.pre.shutdown.clone(),
            listeners: kernel.listeners.clone(),
        };
        let server = launch_server(
            PROFILING_PROCESS_NAME,
            &conf.listen_address(),
            &kernel.listeners,
            debug::router(state),
        )
        .await?;
        started(server)
    })
}

pub fn database_launcher(kernel: Arc<Kernel>) -> Launcher {
    Launcher::new(DATABASE_PROCESS_NAME, true, move || async move {
        let storage = kernel.pre.storage.clone();
        tracing::debug!(storage = ?storage, "Database ready");
        started(ShutdownFn::new(move |_ctx| async move {
            storage.close()?;
            Ok::<_, BoxError>(())
        }))
    })
    .requires(&[StateTag::Storage])
}

/// Local block production with no consensus. Every submitted transaction is
/// committed at the next block tick.
pub fn no_consensus_launcher(kernel: Arc<Kernel>) -> Launcher {
    let enabled = kernel.node.is_none();
    Launcher::new(NO_CONSENSUS_PROCESS_NAME, enabled, move || async move {
        let pre = &kernel.pre;
        let block_duration = block_duration(kernel.config.node.timeout_factor)?;
        let (process, pool) = LocalExecution {
            name: NO_CONSENSUS_PROCESS_NAME.to_string(),
            storage: pre.storage.clone(),
            blockchain: pre.blockchain.clone(),
            block_duration,
            fatal: pre.fatal.clone(),
        }
        .spawn();

        let transactor = Arc::new(Transactor::new(pre.blockchain.clone(), CheckTx::Local(pool)));
        let service = Arc::new(
            Service::new(
                &kernel.config.node.moniker,
                pre.blockchain.clone(),
                pre.storage.clone(),
                transactor.clone(),
            )
            .with_key_store(pre.key_store.clone()),
        );
        publish_execution(&kernel, transactor, service)?;
        started(process)
    })
    .requires(&[StateTag::Storage, StateTag::Blockchain])
    .provides(&EXECUTION_OUTPUTS)
}

/// Local block time from `node.timeout_factor`. Rejects values that cannot
/// drive a block ticker instead of panicking on them.
fn block_duration(timeout_factor: f64) -> Result<Duration, BoxError> {
    let duration = Duration::try_from_secs_f64(timeout_factor)
        .map_err(|e| format!("invalid block time {timeout_factor}: {e}"))?;
    if duration.is_zero() {
        return Err(format!("block time {timeout_factor}s rounds to zero").into());
    }
    Ok(duration)
}

pub fn consensus_launcher(kernel: Arc<Kernel>) -> Launcher {
    let node = kernel.node.clone();
    Launcher::new(CONSENSUS_PROCESS_NAME, node.is_some(), move || async move {
        let node = node.ok_or("consensus launcher enabled without a consensus node")?;
        let pre = &kernel.pre;

        let view = NodeView::from_node(node.as_ref());
        pre.blockchain.set_block_store(node.block_store());
        let transactor = Arc::new(Transactor::new(pre.blockchain.clone(), CheckTx::Mempool(node.clone())));
        let service = Arc::new(
            Service::new(
                &kernel.config.node.moniker,
                pre.blockchain.clone(),
                pre.storage.clone(),
                transactor.clone(),
            )
            .with_node_view(view.clone())
            .with_key_store(pre.key_store.clone()),
        );
        kernel.post.node_view.set(view)?;
        publish_execution(&kernel, transactor, service)?;

        if let Err(e) = node.start().await {
            tracing::warn!(process = CONSENSUS_PROCESS_NAME, error = %e, "Consensus node failed to start, closing it");
            node.close();
            return Err(e);
        }
        started(ShutdownFn::new(move |ctx| stop_consensus(node, ctx)))
    })
    .requires(&[StateTag::Storage, StateTag::Blockchain])
    .provides(&[StateTag::Transactor, StateTag::Service, StateTag::EthService, StateTag::NodeView])
}

fn publish_execution(kernel: &Kernel, transactor: Arc<Transactor>, service: Arc<Service>) -> Result<(), BoxError> {
    let post = &kernel.post;
    post.transactor.set(transactor)?;
    post.eth_service.set(Arc::new(EthService::new(service.clone())))?;
    post.service.set(service)?;
    Ok(())
}

/// Closes the consensus node when dropped, including when the shutdown
/// future is abandoned at the deadline.
struct CloseOnDrop(Arc<dyn ConsensusNode>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Stop the node, always close it, and wait for it to quit within the deadline.
async fn stop_consensus(node: Arc<dyn ConsensusNode>, ctx: ShutdownContext) -> Result<(), BoxError> {
    let _close = CloseOnDrop(node.clone());
    node.stop().await?;
    tokio::select! {
        _ = node.quit() => {
            tracing::info!("Consensus node has quit, closing storage connections");
            Ok(())
        }
        _ = ctx.done() => Err(DeadlineExceeded(CONSENSUS_PROCESS_NAME.to_string()).into()),
    }
}

pub fn startup_launcher(kernel: Arc<Kernel>) -> Launcher {
    let consensus = kernel.node.is_some();
    let requires: &[StateTag] = if consensus { &[StateTag::NodeView] } else { &[] };
    Launcher::new(STARTUP_PROCESS_NAME, kernel.config.lifecycle.announce, move || async move {
        let start = Instant::now();
        let chain = kernel.pre.blockchain.clone();

        if consensus {
            let view = kernel.node_view()?;
            tracing::info!(
                announce = "startup",
                version = env!("CARGO_PKG_VERSION"),
                moniker = %kernel.config.node.moniker,
                chain_id = %chain.chain_id(),
                genesis_time = chain.genesis().genesis_time,
                node_id = %view.node_info.id,
                net_address = %view.node_info.net_address,
                validator_address = ?view.validator_address,
                "Node is launching"
            );
        } else {
            tracing::info!(
                announce = "startup",
                version = env!("CARGO_PKG_VERSION"),
                moniker = %kernel.config.node.moniker,
                chain_id = %chain.chain_id(),
                "Node is launching without consensus"
            );
        }

        started(ShutdownFn::new(move |_ctx| async move {
            tracing::info!(
                announce = "shutdown",
                height = chain.height(),
                elapsed_run_time_secs = start.elapsed().as_secs(),
                "Node is shutting down"
            );
            Ok::<_, BoxError>(())
        }))
    })
    .requires(requires)
}

pub fn web3_launcher(kernel: Arc<Kernel>) -> Launcher {
    let conf = kernel.config.rpc.web3.clone();
    Launcher::new(WEB3_PROCESS_NAME, conf.enabled, move || async move {
        let eth = kernel.post.eth_service.get()?.clone();
        let server = launch_server(WEB3_PROCESS_NAME, &conf.listen_address(), &kernel.listeners, web3::router(eth)).await?;
        started(server)
    })
    .requires(&[StateTag::EthService])
}

pub fn info_launcher(kernel: Arc<Kernel>) -> Launcher {
    let conf = kernel.config.rpc.info.clone();
    Launcher::new(INFO_PROCESS_NAME, conf.enabled, move || async move {
        let state = info::InfoState {
            service: kernel.post.service.get()?.clone(),
            listeners: kernel.listeners.clone(),
        };
        let server = launch_server(INFO_PROCESS_NAME, &conf.listen_address(), &kernel.listeners, info::router(state)).await?;
        started(server)
    })
    .requires(&[StateTag::Service])
}

pub fn metrics_launcher(kernel: Arc<Kernel>) -> Launcher {
    let conf = kernel.config.rpc.metrics.clone();
    Launcher::new(METRICS_PROCESS_NAME, conf.enabled, move || async move {
        let handle = kernel.pre.metrics.clone().unwrap_or_else(|| {
            tracing::warn!("No metrics recorder installed, serving an empty exposition");
            detached_handle()
        });
        let router = rpc::metrics::router(&conf.metrics_path, handle);
        let server = launch_server(METRICS_PROCESS_NAME, &conf.server().listen_address(), &kernel.listeners, router).await?;
        started(server)
    })
}

pub fn query_launcher(kernel: Arc<Kernel>) -> Launcher {
    let conf = kernel.config.rpc.query.clone();
    Launcher::new(QUERY_PROCESS_NAME, conf.enabled, move || async move {
        let state = query::QueryState {
            service: kernel.post.service.get()?.clone(),
            keys: kernel.config.keys.clone(),
            key_store: kernel.pre.key_store.clone(),
        };
        let server = launch_server(QUERY_PROCESS_NAME, &conf.listen_address(), &kernel.listeners, query::router(state)).await?;
        started(server)
    })
    .requires(&[StateTag::Service])
}

pub fn bridge_launcher(kernel: Arc<Kernel>) -> Launcher {
    let conf = kernel.config.bridge.clone();
    Launcher::new(BRIDGE_PROCESS_NAME, conf.enabled, move || async move {
        let control = HttpBridgeControl::from_config(&conf)?;
        tracing::info!(control_url = %control.url(), "Starting bridge");
        let adapter = Arc::new(BridgeAdapter::new(Arc::new(control)));
        let process = BridgeProcess::launch(adapter).await?;
        started(process)
    })
}
