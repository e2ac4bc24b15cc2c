//! Shutdown triggers for the node.

use std::fmt;

use tokio::sync::{mpsc, watch};

/// Administrative shutdown trigger.
///
/// Cheap to clone; every clone fires the same signal. Subscribers created
/// after the trigger fired still observe it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the trigger has fired.
    pub async fn triggered(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Get the number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A fatal condition reported by a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalError {
    pub process: String,
    pub message: String,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.process, self.message)
    }
}

/// Sending half of the fatal-error channel, handed to processes.
#[derive(Debug, Clone)]
pub struct FatalSender {
    tx: mpsc::UnboundedSender<FatalError>,
}

impl FatalSender {
    /// Report a fatal condition. Ignored once the supervisor has gone away.
    pub fn report(&self, process: &str, message: impl fmt::Display) {
        let fatal = FatalError {
            process: process.to_string(),
            message: message.to_string(),
        };
        tracing::error!(process = %fatal.process, error = %fatal.message, "Fatal error reported");
        let _ = self.tx.send(fatal);
    }
}

/// Create the fatal-error channel.
pub fn fatal_channel() -> (FatalSender, mpsc::UnboundedReceiver<FatalError>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FatalSender { tx }, rx)
}

/// What caused the supervisor to begin its shutdown sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// SIGINT / SIGTERM.
    Signal,
    /// Explicit administrative request.
    Requested,
    /// A running process reported a fatal condition.
    Fatal(FatalError),
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Signal => write!(f, "signal"),
            ShutdownTrigger::Requested => write!(f, "request"),
            ShutdownTrigger::Fatal(fatal) => write!(f, "fatal error in {}", fatal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();
        clone.trigger();

        assert!(shutdown.is_triggered());
        shutdown.triggered().await;
    }

    #[tokio::test]
    async fn fatal_reports_are_delivered() {
        let (sender, mut rx) = fatal_channel();
        sender.report("NoConsensusExecution", "storage closed");
        let fatal = rx.recv().await.unwrap();
        assert_eq!(fatal.process, "NoConsensusExecution");
        assert_eq!(fatal.to_string(), "NoConsensusExecution: storage closed");
    }
}
