//! Metrics collection and exposition.
//!
//! # Metrics
//! - `node_processes_started_total` (counter): processes launched, by process
//! - `node_process_failures_total` (counter): launch failures, by process
//! - `node_processes_stopped_total` (counter): shutdown outcomes, by process and outcome
//! - `node_running_processes` (gauge): handles currently held by the supervisor
//! - `node_startup_duration_seconds` (histogram): time to run the launch table
//! - `node_block_height` (gauge): latest committed height
//! - `node_txs_submitted_total` (counter): transactions accepted for broadcast
//! - `node_bridge_ops_total` (counter): bridge operations, by action
//!
//! # Design Decisions
//! - The global recorder is installed once by the binary; tests run without one
//! - Label values are owned strings so callers can pass borrowed names

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder globally.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    Ok(handle)
}

/// A handle backed by a private recorder that nothing writes to. Renders an
/// empty exposition.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

fn describe() {
    metrics::describe_counter!("node_processes_started_total", "Processes launched");
    metrics::describe_counter!("node_process_failures_total", "Process launch failures");
    metrics::describe_counter!("node_processes_stopped_total", "Process shutdown outcomes");
    metrics::describe_gauge!("node_running_processes", "Running process handles");
    metrics::describe_histogram!("node_startup_duration_seconds", "Launch table duration");
    metrics::describe_gauge!("node_block_height", "Latest committed block height");
    metrics::describe_counter!("node_txs_submitted_total", "Transactions accepted");
    metrics::describe_counter!("node_bridge_ops_total", "Bridge operations ingested");
}

pub fn record_process_started(process: &str) {
    counter!("node_processes_started_total", "process" => process.to_string()).increment(1);
}

pub fn record_process_failed(process: &str) {
    counter!("node_process_failures_total", "process" => process.to_string()).increment(1);
}

/// `outcome` is one of `ok`, `error`, `timeout`.
pub fn record_process_stopped(process: &str, outcome: &str) {
    counter!(
        "node_processes_stopped_total",
        "process" => process.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn set_running_processes(count: usize) {
    gauge!("node_running_processes").set(count as f64);
}

pub fn record_startup_duration(elapsed: Duration) {
    histogram!("node_startup_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn set_block_height(height: u64) {
    gauge!("node_block_height").set(height as f64);
}

pub fn record_tx_submitted() {
    counter!("node_txs_submitted_total").increment(1);
}

pub fn record_bridge_op(action: &str) {
    counter!("node_bridge_ops_total", "action" => action.to_string()).increment(1);
}
