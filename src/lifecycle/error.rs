//! Lifecycle error taxonomy.

use std::fmt;

use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::kernel::state::StateTag;

/// Type-erased error returned by launchers and process handles.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the supervisor.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A launcher failed to start. Already-started processes have been unwound.
    #[error("failed to start {name}: {source}")]
    Startup {
        name: String,
        #[source]
        source: BoxError,
        /// Shutdown failures observed while unwinding. Never replaces `source`.
        unwind: Vec<ShutdownFailure>,
    },

    /// One or more processes failed or timed out during the shutdown sweep.
    #[error("shutdown incomplete: {0}")]
    Shutdown(ShutdownReport),

    /// A listener was registered twice under the same subsystem name.
    #[error("listener already registered for {0}")]
    DuplicateRegistration(String),

    /// Invalid configuration detected before any launcher ran.
    #[error("configuration error: {}", join_validation(.0))]
    Configuration(Vec<ValidationError>),

    /// An enabled launcher depends on state no earlier enabled launcher provides.
    #[error("{launcher} requires {tag} which no earlier enabled launcher provides")]
    UnsatisfiedDependency { launcher: String, tag: StateTag },

    /// Two launchers share a name.
    #[error("duplicate launcher name {0}")]
    DuplicateLauncher(String),

    /// A write-once kernel field was written twice.
    #[error("kernel state {0} already set")]
    StateAlreadySet(StateTag),

    /// A kernel field was read before any launcher wrote it.
    #[error("kernel state {0} is not available")]
    StateUnset(StateTag),
}

impl LifecycleError {
    /// Name of the subsystem a startup failure is attributed to.
    pub fn subsystem(&self) -> Option<&str> {
        match self {
            LifecycleError::Startup { name, .. } => Some(name),
            LifecycleError::DuplicateRegistration(name) => Some(name),
            LifecycleError::UnsatisfiedDependency { launcher, .. } => Some(launcher),
            _ => None,
        }
    }

    /// Process exit status for an error that aborts the node before it runs.
    /// Configuration problems exit 2, everything else 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Configuration(_) => 2,
            _ => 1,
        }
    }
}

fn join_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a single process did not shut down cleanly.
#[derive(Debug)]
pub enum ShutdownFailureKind {
    /// The shutdown call returned an error.
    Failed(BoxError),
    /// The shutdown call did not finish before the deadline.
    TimedOut,
}

/// A named shutdown failure.
#[derive(Debug)]
pub struct ShutdownFailure {
    pub name: String,
    pub kind: ShutdownFailureKind,
}

impl ShutdownFailure {
    pub fn failed(name: impl Into<String>, err: BoxError) -> Self {
        Self {
            name: name.into(),
            kind: ShutdownFailureKind::Failed(err),
        }
    }

    pub fn timed_out(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ShutdownFailureKind::TimedOut,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ShutdownFailureKind::TimedOut)
    }
}

impl fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ShutdownFailureKind::Failed(e) => write!(f, "{} failed: {}", self.name, e),
            ShutdownFailureKind::TimedOut => write!(f, "{} timed out", self.name),
        }
    }
}

/// Aggregate of every failure seen during one shutdown sweep.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub failures: Vec<ShutdownFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the subsystems that failed or timed out, in sweep order.
    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn into_result(self) -> Result<(), LifecycleError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(LifecycleError::Shutdown(self))
        }
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_error_names_subsystem() {
        let err = LifecycleError::Startup {
            name: "rpc/info".into(),
            source: "address in use".into(),
            unwind: Vec::new(),
        };
        assert_eq!(err.subsystem(), Some("rpc/info"));
        assert_eq!(err.to_string(), "failed to start rpc/info: address in use");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn configuration_error_exits_two() {
        let err = LifecycleError::Configuration(vec![ValidationError {
            field: "node.chain_id".into(),
            message: "must not be empty".into(),
        }]);
        assert_eq!(err.subsystem(), None);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn report_lists_every_failure() {
        let report = ShutdownReport {
            failures: vec![
                ShutdownFailure::timed_out("Consensus"),
                ShutdownFailure::failed("Database", "close failed".into()),
            ],
        };
        assert_eq!(report.failed_names(), vec!["Consensus", "Database"]);
        assert_eq!(
            report.to_string(),
            "Consensus timed out; Database failed: close failed"
        );
        assert!(matches!(report.into_result(), Err(LifecycleError::Shutdown(_))));
    }
}
