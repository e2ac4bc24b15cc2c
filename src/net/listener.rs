//! Managed TCP listeners and the registry that closes them.
//!
//! # Responsibilities
//! - Bind a listener for a network-facing subsystem
//! - Hand the accepting half to the server, the closing half to the registry
//! - Close every registered listener centrally on shutdown
//!
//! A [`ManagedListener`] owns the socket. Its [`ListenerHandle`] can ask it
//! to close and then waits until the socket has actually been released.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::lifecycle::LifecycleError;

/// Errors from listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to parse or bind the address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The socket was not released within the close timeout.
    #[error("listener for {0} was not released in time")]
    CloseTimeout(String),
}

impl ListenerError {
    /// The address or subsystem the error refers to.
    pub fn name(&self) -> &str {
        match self {
            ListenerError::Bind { address, .. } => address,
            ListenerError::CloseTimeout(name) => name,
        }
    }
}

/// Bind a managed listener on `address` (`host:port`).
pub async fn bind(address: &str) -> Result<(ManagedListener, ListenerHandle), ListenerError> {
    let addr: SocketAddr = address.parse().map_err(|e| ListenerError::Bind {
        address: address.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
    })?;

    let inner = TcpListener::bind(addr).await.map_err(|source| ListenerError::Bind {
        address: address.to_string(),
        source,
    })?;
    let local_addr = inner.local_addr().map_err(|source| ListenerError::Bind {
        address: address.to_string(),
        source,
    })?;

    tracing::info!(address = %local_addr, "Listener bound");

    let (close_tx, close_rx) = watch::channel(false);
    let (released_tx, released_rx) = watch::channel(false);

    let listener = ManagedListener {
        inner: Some(inner),
        local_addr,
        close: close_rx,
        released: released_tx,
    };
    let handle = ListenerHandle {
        local_addr,
        close: Arc::new(close_tx),
        released: released_rx,
    };
    Ok((listener, handle))
}

/// The accepting half. Serve it with `axum::serve`.
#[derive(Debug)]
pub struct ManagedListener {
    inner: Option<TcpListener>,
    local_addr: SocketAddr,
    close: watch::Receiver<bool>,
    released: watch::Sender<bool>,
}

/// A dropped sender counts as a close request.
async fn wait_closed(close: &mut watch::Receiver<bool>) {
    let _ = close.wait_for(|closed| *closed).await;
}

enum Accepted {
    Connection(std::io::Result<(TcpStream, SocketAddr)>),
    Closed,
}

impl ManagedListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A future resolving when the listener is asked to close, for use as a
    /// graceful shutdown signal.
    pub fn close_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut close = self.close.clone();
        async move { wait_closed(&mut close).await }
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(address = %self.local_addr, "Listener released");
        }
        self.released.send_replace(true);
    }

    async fn next(&mut self) -> Option<(TcpStream, SocketAddr)> {
        loop {
            let outcome = {
                let inner = self.inner.as_ref()?;
                let close = &mut self.close;
                tokio::select! {
                    res = inner.accept() => Accepted::Connection(res),
                    _ = wait_closed(close) => Accepted::Closed,
                }
            };

            match outcome {
                Accepted::Connection(Ok(conn)) => return Some(conn),
                Accepted::Connection(Err(e)) => {
                    tracing::warn!(address = %self.local_addr, error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Accepted::Closed => {
                    self.release();
                    return None;
                }
            }
        }
    }
}

impl Drop for ManagedListener {
    fn drop(&mut self) {
        self.release();
    }
}

impl axum::serve::Listener for ManagedListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.next().await {
            Some(conn) => conn,
            // Closed: axum stops accepting through the graceful shutdown
            // signal, which fires on the same close request.
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

/// The closing half of a managed listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    close: Arc<watch::Sender<bool>>,
    released: watch::Receiver<bool>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the socket has been released.
    pub fn is_released(&self) -> bool {
        *self.released.borrow() || self.released.has_changed().is_err()
    }

    /// Ask the listener to close and wait until its socket is released.
    /// Closing an already-closed listener succeeds.
    pub async fn close(&self) {
        self.close.send_replace(true);
        let mut released = self.released.clone();
        let _ = released.wait_for(|released| *released).await;
    }
}

/// Registered listeners keyed by subsystem name.
#[derive(Debug)]
pub struct ListenerRegistry {
    entries: Mutex<HashMap<String, ListenerHandle>>,
    release_timeout: Duration,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::with_release_timeout(Duration::from_secs(5))
    }

    pub fn with_release_timeout(release_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            release_timeout,
        }
    }

    /// Register the listener for `name`. A second registration under the same
    /// name fails and leaves the first entry in place.
    pub fn register(&self, name: &str, handle: ListenerHandle) -> Result<(), LifecycleError> {
        let mut entries = self.lock();
        if entries.contains_key(name) {
            tracing::error!(process = %name, "Duplicate listener registration");
            return Err(LifecycleError::DuplicateRegistration(name.to_string()));
        }
        tracing::debug!(process = %name, address = %handle.local_addr(), "Listener registered");
        entries.insert(name.to_string(), handle);
        Ok(())
    }

    /// Address of the listener registered for `name`.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.lock().get(name).map(ListenerHandle::local_addr)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Close and remove the listener for `name`, if one is registered.
    pub async fn close(&self, name: &str) -> Result<(), ListenerError> {
        let handle = self.lock().remove(name);
        match handle {
            Some(handle) => self.close_handle(name, handle).await,
            None => Ok(()),
        }
    }

    /// Close every registered listener. Returns the first error but still
    /// attempts to close the rest.
    pub async fn close_all(&self) -> Result<(), ListenerError> {
        let drained: Vec<(String, ListenerHandle)> = self.lock().drain().collect();
        let mut first_error = None;
        for (name, handle) in drained {
            if let Err(e) = self.close_handle(&name, handle).await {
                tracing::warn!(process = %name, error = %e, "Failed to close listener");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn close_handle(&self, name: &str, handle: ListenerHandle) -> Result<(), ListenerError> {
        match tokio::time::timeout(self.release_timeout, handle.close()).await {
            Ok(()) => {
                tracing::debug!(process = %name, address = %handle.local_addr(), "Listener closed");
                Ok(())
            }
            Err(_) => Err(ListenerError::CloseTimeout(name.to_string())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ListenerHandle>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
