//! Run state and stop control for long-running services.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl ServiceState {
    /// Nothing is running: never started, or finished.
    pub fn is_quiescent(&self) -> bool {
        matches!(self, ServiceState::Idle | ServiceState::Stopped)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::Idle => "idle",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Create the two halves of a service's control channel.
pub fn service_pair(name: &'static str) -> (ServiceRuntime, ServiceHandle) {
    let (state_tx, state_rx) = watch::channel(ServiceState::Idle);
    let (stop_tx, stop_rx) = watch::channel(false);

    (
        ServiceRuntime { state_tx, stop_rx },
        ServiceHandle {
            name,
            state_rx,
            stop_tx: Arc::new(stop_tx),
        },
    )
}

/// Service-side half: publishes state, observes the stop signal.
#[derive(Debug)]
pub struct ServiceRuntime {
    state_tx: watch::Sender<ServiceState>,
    stop_rx: watch::Receiver<bool>,
}

impl ServiceRuntime {
    pub fn set_state(&self, state: ServiceState) {
        self.state_tx.send_replace(state);
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Resolves once stop has been requested, or every handle is gone.
    pub async fn stopped(&mut self) {
        let _ = self.stop_rx.wait_for(|stop| *stop).await;
    }
}

/// Controller-side half: reads state, requests stop. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    name: &'static str,
    state_rx: watch::Receiver<ServiceState>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl ServiceHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    /// Request stop. Safe to call any number of times; returns true for the first request.
    pub fn stop(&self) -> bool {
        let first = self.stop_tx.send_if_modified(|stop| !std::mem::replace(stop, true));
        if first {
            info!(service = self.name, "Shutdown requested...");
        }
        first
    }

    /// Wait until the service is not running.
    ///
    /// A service whose runtime was dropped counts as stopped.
    pub async fn wait_stopped(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|s| s.is_quiescent()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_is_idempotent_and_observed() {
        let (mut runtime, handle) = service_pair("test");
        assert!(!runtime.stop_requested());

        assert!(handle.stop());
        assert!(!handle.clone().stop());

        assert!(runtime.stop_requested());
        tokio::time::timeout(Duration::from_millis(100), runtime.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_stopped_follows_state() {
        let (runtime, handle) = service_pair("test");
        runtime.set_state(ServiceState::Running);
        assert_eq!(handle.state(), ServiceState::Running);

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_stopped().await })
        };

        runtime.set_state(ServiceState::Stopping);
        runtime.set_state(ServiceState::Stopped);

        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_dropped_runtime_counts_as_stopped() {
        let (runtime, handle) = service_pair("test");
        runtime.set_state(ServiceState::Running);
        drop(runtime);

        tokio::time::timeout(Duration::from_millis(100), handle.wait_stopped())
            .await
            .unwrap();
    }
}
