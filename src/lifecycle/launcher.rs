//! Launcher descriptors and the dependency contract between them.
//!
//! The launch table is an ordered list. Order alone decides when a launcher
//! runs; the `requires`/`provides` tags only document and check that order.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;

use crate::kernel::state::StateTag;
use crate::lifecycle::error::{BoxError, LifecycleError};
use crate::lifecycle::process::Process;

type LaunchFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<Box<dyn Process>, BoxError>> + Send>;

/// Describes one subsystem: a name, an enabled flag and a start function.
pub struct Launcher {
    name: String,
    enabled: bool,
    requires: Vec<StateTag>,
    provides: Vec<StateTag>,
    launch: LaunchFn,
}

impl Launcher {
    pub fn new<F, Fut>(name: impl Into<String>, enabled: bool, launch: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Box<dyn Process>, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            enabled,
            requires: Vec::new(),
            provides: Vec::new(),
            launch: Box::new(move || Box::pin(launch())),
        }
    }

    /// Declare kernel state this launcher reads.
    pub fn requires(mut self, tags: &[StateTag]) -> Self {
        self.requires.extend_from_slice(tags);
        self
    }

    /// Declare kernel state this launcher writes.
    pub fn provides(mut self, tags: &[StateTag]) -> Self {
        self.provides.extend_from_slice(tags);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn required(&self) -> &[StateTag] {
        &self.requires
    }

    pub fn provided(&self) -> &[StateTag] {
        &self.provides
    }

    /// Consume the descriptor and run its start function.
    pub(crate) async fn launch(self) -> Result<Box<dyn Process>, BoxError> {
        (self.launch)().await
    }
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launcher")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("requires", &self.requires)
            .field("provides", &self.provides)
            .finish_non_exhaustive()
    }
}

/// Check the launch table against its declared dependencies.
///
/// Only enabled launchers count: a tag provided by a disabled launcher is
/// not available to anything after it. `available` holds tags written before
/// the first launcher runs.
pub fn check_dependencies(launchers: &[Launcher], available: &[StateTag]) -> Result<(), LifecycleError> {
    let mut names = HashSet::new();
    for launcher in launchers {
        if !names.insert(launcher.name()) {
            return Err(LifecycleError::DuplicateLauncher(launcher.name().to_string()));
        }
    }

    let mut provided: HashSet<StateTag> = available.iter().copied().collect();
    for launcher in launchers.iter().filter(|l| l.is_enabled()) {
        if let Some(tag) = launcher.required().iter().find(|tag| !provided.contains(tag)) {
            return Err(LifecycleError::UnsatisfiedDependency {
                launcher: launcher.name().to_string(),
                tag: *tag,
            });
        }
        provided.extend(launcher.provided().iter().copied());
    }
    Ok(())
}
