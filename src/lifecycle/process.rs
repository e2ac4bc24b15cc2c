//! Process handles returned by launchers.
//!
//! A handle is owned by the supervisor from the moment its launcher returns
//! until the shutdown sweep reaches it. Every implementation tolerates a
//! second `shutdown` call without releasing anything twice.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::lifecycle::error::BoxError;

/// Deadline shared by every handle in one shutdown sweep.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownContext {
    deadline: Instant,
}

impl ShutdownContext {
    pub fn new(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(deadline_after(timeout))
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Budget left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Resolves when the deadline passes.
    pub async fn done(&self) {
        tokio::time::sleep_until(self.deadline).await
    }
}

/// Roughly 30 years; stands in for "no deadline" when an addition overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, saturating instead of panicking on overflow.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// A running subsystem.
#[async_trait]
pub trait Process: Send {
    /// Tear the subsystem down, finishing before `ctx` expires where possible.
    async fn shutdown(&mut self, ctx: ShutdownContext) -> Result<(), BoxError>;
}

type ShutdownCallback = Box<dyn FnOnce(ShutdownContext) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// A process whose teardown is a single closure, run at most once.
pub struct ShutdownFn {
    callback: Option<ShutdownCallback>,
}

impl ShutdownFn {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(ShutdownContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            callback: Some(Box::new(move |ctx| Box::pin(f(ctx)))),
        }
    }
}

#[async_trait]
impl Process for ShutdownFn {
    async fn shutdown(&mut self, ctx: ShutdownContext) -> Result<(), BoxError> {
        match self.callback.take() {
            Some(callback) => callback(ctx).await,
            None => Ok(()),
        }
    }
}

/// Background work with no explicit teardown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcess;

#[async_trait]
impl Process for NoopProcess {
    async fn shutdown(&mut self, _ctx: ShutdownContext) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Error returned when a background task does not stop before the deadline.
#[derive(Debug, thiserror::Error)]
#[error("{0} did not stop before the shutdown deadline")]
pub struct DeadlineExceeded(pub String);

/// A spawned task stopped through a watch signal and joined within the deadline.
///
/// The task receives a `watch::Receiver<bool>` that flips to `true` when the
/// supervisor asks it to stop.
pub struct TaskProcess {
    name: String,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), BoxError>>>,
}

impl TaskProcess {
    pub fn spawn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(f(stop_rx));
        Self {
            name: name.into(),
            stop,
            task: Some(task),
        }
    }

    /// Whether the background task has already exited on its own.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// Wait for a stop signal. A dropped sender counts as a stop.
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[async_trait]
impl Process for TaskProcess {
    async fn shutdown(&mut self, ctx: ShutdownContext) -> Result<(), BoxError> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        let _ = self.stop.send(true);

        match tokio::time::timeout_at(ctx.deadline(), &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Box::new(join_err)),
            Err(_) => {
                task.abort();
                Err(Box::new(DeadlineExceeded(self.name.clone())))
            }
        }
    }
}
