//! Supervised bridge lifecycle.
//!
//! Start and stop each produce their own result type. The process handle
//! runs a flushing stop first and, only if that fails, a forced stop; the
//! two outcomes are reported separately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::control::{BridgeControl, BridgeFlags, BridgeStatus, BridgeVerb};
use super::error::BridgeError;
use crate::lifecycle::{BoxError, Process, ShutdownContext};

/// Proof that the bridge was started.
#[derive(Debug, Clone, Copy)]
pub struct BridgeRunning {
    pub status: BridgeStatus,
    pub started_at: Instant,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStopped {
    Stopped,
    /// Nothing was running; no request was sent or the bridge said so.
    AlreadyStopped,
}

/// Tracks whether the bridge is running and makes `stop` idempotent.
pub struct BridgeAdapter {
    control: Arc<dyn BridgeControl>,
    running: AtomicBool,
}

impl BridgeAdapter {
    pub fn new(control: Arc<dyn BridgeControl>) -> Self {
        Self {
            control,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn start(&self) -> Result<BridgeRunning, BridgeError> {
        let status = self
            .control
            .send(BridgeVerb::Start, BridgeFlags::START)
            .await
            .map_err(|e| BridgeError::StartFailed(Box::new(e)))?;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(status = ?status, "Bridge started");
        Ok(BridgeRunning {
            status,
            started_at: Instant::now(),
        })
    }

    /// Stop the bridge. Stopping a bridge that is not running succeeds
    /// without contacting it. A failed stop leaves the bridge marked running
    /// so a later stop can retry.
    pub async fn stop(&self, flags: BridgeFlags) -> Result<BridgeStopped, BridgeError> {
        if !self.is_running() {
            return Ok(BridgeStopped::AlreadyStopped);
        }
        let status = self.control.send(BridgeVerb::Stop, flags).await?;
        self.running.store(false, Ordering::SeqCst);
        Ok(match status {
            BridgeStatus::AlreadyStopped => BridgeStopped::AlreadyStopped,
            _ => BridgeStopped::Stopped,
        })
    }

    /// Send a forced stop whether or not a start succeeded. Used to clean up
    /// a bridge that may have come half way up.
    pub async fn force_stop(&self) -> Result<BridgeStopped, BridgeError> {
        let status = self.control.send(BridgeVerb::Stop, BridgeFlags::FORCE_STOP).await?;
        self.running.store(false, Ordering::SeqCst);
        Ok(match status {
            BridgeStatus::AlreadyStopped => BridgeStopped::AlreadyStopped,
            _ => BridgeStopped::Stopped,
        })
    }
}

impl std::fmt::Debug for BridgeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeAdapter")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Process handle for a started bridge.
pub struct BridgeProcess {
    adapter: Arc<BridgeAdapter>,
    token: Option<BridgeRunning>,
}

impl BridgeProcess {
    /// Start the bridge. If the start fails, a forced stop is attempted and
    /// its failure logged; the start error is what the caller sees.
    pub async fn launch(adapter: Arc<BridgeAdapter>) -> Result<Self, BridgeError> {
        match adapter.start().await {
            Ok(token) => Ok(Self {
                adapter,
                token: Some(token),
            }),
            Err(e) => {
                match adapter.force_stop().await {
                    Ok(stopped) => tracing::info!(result = ?stopped, "Bridge cleaned up after failed start"),
                    Err(cleanup) => {
                        tracing::warn!(error = %cleanup, "Bridge cleanup after failed start did not complete")
                    }
                }
                Err(e)
            }
        }
    }

    /// Primary flushing stop, then a forced stop only if the primary failed.
    pub async fn stop(&mut self) -> Result<BridgeStopped, BridgeError> {
        let Some(token) = self.token.take() else {
            return Ok(BridgeStopped::AlreadyStopped);
        };

        let primary = match self.adapter.stop(BridgeFlags::STOP).await {
            Ok(stopped) => {
                tracing::info!(
                    uptime_secs = token.started_at.elapsed().as_secs(),
                    "Bridge stopped"
                );
                return Ok(stopped);
            }
            Err(e) => e,
        };

        tracing::warn!(error = %primary, "Bridge stop failed, forcing");
        match self.adapter.stop(BridgeFlags::FORCE_STOP).await {
            Ok(_) => Err(BridgeError::StopFailed(Box::new(primary))),
            Err(cleanup) => Err(BridgeError::CleanupFailed {
                primary: Box::new(primary),
                cleanup: Box::new(cleanup),
            }),
        }
    }
}

#[async_trait]
impl Process for BridgeProcess {
    async fn shutdown(&mut self, _ctx: ShutdownContext) -> Result<(), BoxError> {
        self.stop().await.map(|_| ()).map_err(Into::into)
    }
}
