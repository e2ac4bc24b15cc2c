//! The supervisor: ordered startup, unwind on failure, reverse-order shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::LifecycleConfig;
use crate::lifecycle::error::{LifecycleError, ShutdownFailure, ShutdownReport};
use crate::lifecycle::launcher::Launcher;
use crate::lifecycle::process::{deadline_after, Process, ShutdownContext};
use crate::lifecycle::shutdown::{FatalError, Shutdown, ShutdownTrigger};
use crate::lifecycle::signals;
use crate::net::ListenerRegistry;
use crate::observability::metrics;

/// Timing policy for the shutdown sweep.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    /// Total budget for one shutdown sweep.
    pub grace_period: Duration,
    /// Minimum slice a handle gets once the shared deadline has passed.
    pub best_effort_floor: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            best_effort_floor: Duration::from_millis(100),
        }
    }
}

impl From<&LifecycleConfig> for SupervisorSettings {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            grace_period: Duration::from_secs(config.shutdown_grace_secs),
            best_effort_floor: Duration::from_millis(config.best_effort_floor_ms),
        }
    }
}

struct RunningProcess {
    name: String,
    process: Box<dyn Process>,
}

/// Owns every running process handle.
pub struct Supervisor {
    running: Vec<RunningProcess>,
    listeners: Arc<ListenerRegistry>,
    settings: SupervisorSettings,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("running", &self.running())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Supervisor {
    pub fn new(listeners: Arc<ListenerRegistry>, settings: SupervisorSettings) -> Self {
        Self {
            running: Vec::new(),
            listeners,
            settings,
        }
    }

    /// Start every enabled launcher in order.
    ///
    /// On the first failure every process already started is shut down in
    /// reverse order and the start error is returned.
    pub async fn start(&mut self, launchers: Vec<Launcher>) -> Result<(), LifecycleError> {
        let started_at = Instant::now();

        for launcher in launchers {
            let name = launcher.name().to_string();
            if !launcher.is_enabled() {
                tracing::debug!(process = %name, "Launcher disabled, skipping");
                continue;
            }

            tracing::debug!(process = %name, "Launching process");
            match launcher.launch().await {
                Ok(process) => {
                    tracing::info!(process = %name, "Process started");
                    metrics::record_process_started(&name);
                    self.running.push(RunningProcess { name, process });
                    metrics::set_running_processes(self.running.len());
                }
                Err(source) => {
                    tracing::error!(process = %name, error = %source, "Process failed to start, unwinding");
                    metrics::record_process_failed(&name);
                    let report = self.sweep(ShutdownContext::with_timeout(self.settings.grace_period)).await;
                    for failure in &report.failures {
                        tracing::warn!(process = %failure.name, error = %failure, "Unwind did not complete cleanly");
                    }
                    return Err(LifecycleError::Startup {
                        name,
                        source,
                        unwind: report.failures,
                    });
                }
            }
        }

        metrics::record_startup_duration(started_at.elapsed());
        tracing::info!(
            processes = self.running.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "All processes started"
        );
        Ok(())
    }

    /// Shut every running process down, most recently started first.
    ///
    /// The grace period bounds the whole sweep. Every handle gets an attempt
    /// even when earlier ones fail or the deadline has already passed.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        let ctx = ShutdownContext::with_timeout(self.settings.grace_period);
        tracing::info!(
            processes = self.running.len(),
            grace_ms = self.settings.grace_period.as_millis() as u64,
            "Shutting down"
        );
        self.sweep(ctx).await.into_result()
    }

    async fn sweep(&mut self, ctx: ShutdownContext) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        while let Some(RunningProcess { name, mut process }) = self.running.pop() {
            let deadline = ctx.deadline().max(deadline_after(self.settings.best_effort_floor));
            let handle_ctx = ShutdownContext::new(deadline);

            match tokio::time::timeout_at(deadline, self.listeners.close(&name)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => report.failures.push(ShutdownFailure::failed(&name, Box::new(e))),
                Err(_) => report.failures.push(ShutdownFailure::timed_out(&name)),
            }

            match tokio::time::timeout_at(deadline, process.shutdown(handle_ctx)).await {
                Ok(Ok(())) => {
                    tracing::info!(process = %name, "Process stopped");
                    metrics::record_process_stopped(&name, "ok");
                }
                Ok(Err(e)) => {
                    tracing::warn!(process = %name, error = %e, "Process failed to stop cleanly");
                    metrics::record_process_stopped(&name, "error");
                    report.failures.push(ShutdownFailure::failed(&name, e));
                }
                Err(_) => {
                    tracing::warn!(process = %name, "Process did not stop before the deadline");
                    metrics::record_process_stopped(&name, "timeout");
                    report.failures.push(ShutdownFailure::timed_out(&name));
                }
            }
            metrics::set_running_processes(self.running.len());
        }

        if let Err(e) = self.listeners.close_all().await {
            tracing::warn!(error = %e, "Failed to close remaining listeners");
            report.failures.push(ShutdownFailure::failed(e.name().to_string(), Box::new(e)));
        }
        report
    }

    /// Names of running processes in start order.
    pub fn running(&self) -> Vec<&str> {
        self.running.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Wait for the first shutdown trigger: a signal, an administrative
    /// request or a fatal error from a running process.
    pub async fn wait_for_trigger(
        shutdown: &Shutdown,
        fatal: &mut mpsc::UnboundedReceiver<FatalError>,
    ) -> ShutdownTrigger {
        let trigger = tokio::select! {
            _ = signals::shutdown_signal() => ShutdownTrigger::Signal,
            _ = shutdown.triggered() => ShutdownTrigger::Requested,
            Some(fatal) = fatal.recv() => ShutdownTrigger::Fatal(fatal),
        };
        tracing::info!(trigger = %trigger, "Shutdown triggered");
        trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::error::BoxError;
    use crate::lifecycle::process::{NoopProcess, ShutdownFn};
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn recording(name: &'static str, journal: &Journal) -> Launcher {
        let journal = journal.clone();
        Launcher::new(name, true, move || async move {
            journal.lock().unwrap().push(format!("start {name}"));
            let process = ShutdownFn::new(move |_ctx| async move {
                journal.lock().unwrap().push(format!("stop {name}"));
                Ok(())
            });
            Ok(Box::new(process) as Box<dyn Process>)
        })
    }

    fn failing(name: &'static str) -> Launcher {
        Launcher::new(name, true, move || async move {
            Err::<Box<dyn Process>, BoxError>(format!("{name} exploded").into())
        })
    }

    fn supervisor() -> Supervisor {
        Supervisor::new(Arc::new(ListenerRegistry::new()), SupervisorSettings::default())
    }

    #[tokio::test]
    async fn starts_in_order_and_stops_in_reverse() {
        let journal = Journal::default();
        let mut sup = supervisor();
        sup.start(vec![
            recording("a", &journal),
            recording("b", &journal),
            recording("c", &journal),
        ])
        .await
        .unwrap();
        assert_eq!(sup.running(), vec!["a", "b", "c"]);

        sup.shutdown().await.unwrap();
        assert!(sup.running().is_empty());
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["start a", "start b", "start c", "stop c", "stop b", "stop a"]
        );
    }

    #[tokio::test]
    async fn disabled_launcher_never_invoked() {
        let journal = Journal::default();
        let touched = journal.clone();
        let disabled = Launcher::new("off", false, move || async move {
            touched.lock().unwrap().push("start off".into());
            Ok(Box::new(NoopProcess) as Box<dyn Process>)
        });

        let mut sup = supervisor();
        sup.start(vec![disabled, recording("on", &journal)]).await.unwrap();
        assert_eq!(sup.running(), vec!["on"]);
        assert_eq!(*journal.lock().unwrap(), vec!["start on"]);
    }

    #[tokio::test]
    async fn failure_unwinds_earlier_processes_once() {
        let journal = Journal::default();
        let mut sup = supervisor();
        let err = sup
            .start(vec![
                recording("a", &journal),
                recording("b", &journal),
                failing("c"),
                recording("d", &journal),
            ])
            .await
            .unwrap_err();

        assert_eq!(err.subsystem(), Some("c"));
        assert!(err.to_string().contains("c exploded"));
        assert!(sup.running().is_empty());
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );

        // A second sweep has nothing left to release.
        sup.shutdown().await.unwrap();
        assert_eq!(journal.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unwind_errors_do_not_replace_start_error() {
        let bad_stop = Launcher::new("a", true, || async {
            let process = ShutdownFn::new(|_ctx| async { Err::<(), BoxError>("close failed".into()) });
            Ok(Box::new(process) as Box<dyn Process>)
        });

        let mut sup = supervisor();
        let err = sup.start(vec![bad_stop, failing("b")]).await.unwrap_err();
        match err {
            LifecycleError::Startup { name, source, unwind } => {
                assert_eq!(name, "b");
                assert_eq!(source.to_string(), "b exploded");
                assert_eq!(unwind.len(), 1);
                assert_eq!(unwind[0].name, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn shutdown_attempts_every_handle_after_failure() {
        let journal = Journal::default();
        let bad_stop = Launcher::new("b", true, || async {
            let process = ShutdownFn::new(|_ctx| async { Err::<(), BoxError>("stuck".into()) });
            Ok(Box::new(process) as Box<dyn Process>)
        });

        let mut sup = supervisor();
        sup.start(vec![recording("a", &journal), bad_stop, recording("c", &journal)])
            .await
            .unwrap();

        match sup.shutdown().await.unwrap_err() {
            LifecycleError::Shutdown(report) => assert_eq!(report.failed_names(), vec!["b"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["start a", "start c", "stop c", "stop a"]
        );
    }

    #[tokio::test]
    async fn unbounded_budgets_do_not_overflow() {
        let journal = Journal::default();
        let settings = SupervisorSettings {
            grace_period: Duration::MAX,
            best_effort_floor: Duration::MAX,
        };
        let mut sup = Supervisor::new(Arc::new(ListenerRegistry::new()), settings);
        sup.start(vec![recording("a", &journal), recording("b", &journal)])
            .await
            .unwrap();

        sup.shutdown().await.unwrap();
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }

    #[tokio::test]
    async fn requested_trigger_wins() {
        let shutdown = Shutdown::new();
        let (_fatal_tx, mut fatal_rx) = crate::lifecycle::shutdown::fatal_channel();
        shutdown.trigger();
        let trigger = Supervisor::wait_for_trigger(&shutdown, &mut fatal_rx).await;
        assert_eq!(trigger, ShutdownTrigger::Requested);
    }

    #[tokio::test]
    async fn fatal_trigger_carries_process() {
        let shutdown = Shutdown::new();
        let (fatal_tx, mut fatal_rx) = crate::lifecycle::shutdown::fatal_channel();
        fatal_tx.report("NoConsensusExecution", "disk full");
        match Supervisor::wait_for_trigger(&shutdown, &mut fatal_rx).await {
            ShutdownTrigger::Fatal(fatal) => assert_eq!(fatal.process, "NoConsensusExecution"),
            other => panic!("unexpected trigger: {other}"),
        }
    }
}
