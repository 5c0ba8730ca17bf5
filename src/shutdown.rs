//! Process lifecycle: ordered teardown of services and shared resources.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::lifecycle::ServiceHandle;

/// A shared resource released once all services have drained.
#[async_trait]
pub trait Releasable: Send + Sync {
    fn name(&self) -> &'static str;
    async fn release(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(&'static str),
    StartupFault(String),
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal {name}"),
            ShutdownReason::StartupFault(msg) => write!(f, "startup fault: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every service stopped in time and every resource released
    Clean,
    /// Teardown ran to completion but something went wrong
    Faulted,
    /// A shutdown was already in progress
    Forced,
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownOutcome::Clean => 0,
            ShutdownOutcome::Faulted | ShutdownOutcome::Forced => 1,
        }
    }
}

/// Single authority for stopping the process.
pub struct ShutdownCoordinator {
    shutting_down: AtomicBool,
    services: Mutex<Vec<ServiceHandle>>,
    resources: Mutex<Vec<Arc<dyn Releasable>>>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self {
            shutting_down: AtomicBool::new(false),
            services: Mutex::new(Vec::new()),
            resources: Mutex::new(Vec::new()),
            grace,
        }
    }

    pub fn register_service(&self, handle: ServiceHandle) {
        self.services.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    /// Resources are released in registration order.
    pub fn register_resource(&self, resource: Arc<dyn Releasable>) {
        self.resources.lock().unwrap_or_else(|e| e.into_inner()).push(resource);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop all services, wait for them within the grace period, then release resources.
    ///
    /// Only the first caller runs teardown; any later call returns [`ShutdownOutcome::Forced`]
    /// immediately.
    pub async fn shutdown(&self, reason: ShutdownReason) -> ShutdownOutcome {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            warn!(reason = %reason, "Shutdown already in progress, forcing exit");
            return ShutdownOutcome::Forced;
        }

        info!(reason = %reason, grace_ms = self.grace.as_millis() as u64, "Shutting down...");
        let mut faulted = matches!(reason, ShutdownReason::StartupFault(_));

        let services = self.services.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for service in &services {
            service.stop();
        }

        let drained = futures::future::join_all(services.iter().map(|s| s.wait_stopped()));
        if tokio::time::timeout(self.grace, drained).await.is_err() {
            let pending: Vec<String> = services
                .iter()
                .filter(|s| !s.state().is_quiescent())
                .map(|s| format!("{}={}", s.name(), s.state()))
                .collect();
            warn!(?pending, "Services did not stop within grace period");
            faulted = true;
        } else {
            info!(count = services.len(), "All services stopped");
        }

        let resources = self.resources.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for resource in resources {
            let name = resource.name();
            // Spawned so a panicking release is contained
            let task = tokio::spawn(async move { resource.release().await });

            match tokio::time::timeout(self.grace, task).await {
                Ok(Ok(Ok(()))) => info!(resource = name, "Released"),
                Ok(Ok(Err(e))) => {
                    error!(resource = name, error = %e, "Failed to release resource");
                    faulted = true;
                }
                Ok(Err(e)) => {
                    error!(resource = name, error = %e, "Resource release panicked");
                    faulted = true;
                }
                Err(_) => {
                    error!(resource = name, "Resource release timed out");
                    faulted = true;
                }
            }
        }

        let outcome = if faulted {
            ShutdownOutcome::Faulted
        } else {
            ShutdownOutcome::Clean
        };
        info!(?outcome, "Shutdown complete");
        outcome
    }

    /// Tear down whatever was registered before `err` aborted startup.
    pub async fn fail_startup(&self, err: &anyhow::Error) -> ShutdownOutcome {
        error!(error = %format!("{err:#}"), "Startup failed");
        self.shutdown(ShutdownReason::StartupFault(format!("{err:#}"))).await
    }

    /// Like [`shutdown`](Self::shutdown), but if `interrupt` resolves before teardown
    /// finishes its reason is fed back into the coordinator, which forces the exit.
    pub async fn shutdown_or_force<F>(&self, reason: ShutdownReason, interrupt: F) -> ShutdownOutcome
    where
        F: Future<Output = ShutdownReason>,
    {
        let teardown = self.shutdown(reason);
        tokio::pin!(teardown);

        tokio::select! {
            outcome = &mut teardown => outcome,
            second = interrupt => self.shutdown(second).await,
        }
    }
}

/// Wait for a termination signal (SIGINT/SIGTERM, or Ctrl+C off unix).
pub async fn wait_for_signal() -> Result<&'static str> {
    #[cfg(unix)]
    let name = {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    };

    #[cfg(not(unix))]
    let name = {
        tokio::signal::ctrl_c().await?;
        "CTRL_C"
    };

    info!("Received {}", name);
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{service_pair, ServiceState};
    use crate::testing::CountingResource;

    #[tokio::test]
    async fn test_clean_shutdown_stops_services_then_releases() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let (mut runtime, handle) = service_pair("worker");
        runtime.set_state(ServiceState::Running);

        let worker = tokio::spawn(async move {
            runtime.stopped().await;
            runtime.set_state(ServiceState::Stopping);
            runtime.set_state(ServiceState::Stopped);
        });

        let resource = Arc::new(CountingResource::default());
        coordinator.register_service(handle.clone());
        coordinator.register_resource(resource.clone());

        let outcome = coordinator.shutdown(ShutdownReason::Signal("SIGTERM")).await;

        assert_eq!(outcome, ShutdownOutcome::Clean);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(handle.state(), ServiceState::Stopped);
        assert_eq!(resource.releases(), 1);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_shutdowns_tear_down_once() {
        let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_millis(200)));
        let resource = Arc::new(CountingResource::default());
        coordinator.register_resource(resource.clone());

        let a = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.shutdown(ShutdownReason::Signal("SIGINT")).await })
        };
        let b = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.shutdown(ShutdownReason::Signal("SIGTERM")).await })
        };

        let mut outcomes = vec![a.await.unwrap(), b.await.unwrap()];
        outcomes.sort_by_key(|o| *o as u8);

        assert_eq!(outcomes, vec![ShutdownOutcome::Clean, ShutdownOutcome::Forced]);
        assert_eq!(resource.releases(), 1);
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_stuck_service_faults_after_grace() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        let (runtime, handle) = service_pair("stuck");
        runtime.set_state(ServiceState::Running);
        coordinator.register_service(handle);

        let resource = Arc::new(CountingResource::default());
        coordinator.register_resource(resource.clone());

        let outcome = coordinator.shutdown(ShutdownReason::Signal("SIGTERM")).await;

        assert_eq!(outcome, ShutdownOutcome::Faulted);
        assert_eq!(outcome.exit_code(), 1);
        // Resources are still released
        assert_eq!(resource.releases(), 1);
        drop(runtime);
    }

    #[tokio::test]
    async fn test_panicking_release_is_contained() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(200));
        let panicking = Arc::new(CountingResource::panicking());
        let healthy = Arc::new(CountingResource::default());
        coordinator.register_resource(panicking);
        coordinator.register_resource(healthy.clone());

        let outcome = coordinator.shutdown(ShutdownReason::Signal("SIGTERM")).await;

        assert_eq!(outcome, ShutdownOutcome::Faulted);
        assert_eq!(healthy.releases(), 1);
    }

    #[tokio::test]
    async fn test_startup_fault_exits_nonzero() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        let outcome = coordinator
            .shutdown(ShutdownReason::StartupFault("database unreachable".into()))
            .await;
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_failed_startup_releases_what_was_registered() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        let db = Arc::new(CountingResource::default());
        coordinator.register_resource(db.clone());

        let err = anyhow::anyhow!("invalid url").context("building RPC client");
        let outcome = coordinator.fail_startup(&err).await;

        assert_eq!(outcome, ShutdownOutcome::Faulted);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(db.releases(), 1);
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_second_signal_forces_exit_through_coordinator() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let (runtime, handle) = service_pair("stuck");
        runtime.set_state(ServiceState::Running);
        coordinator.register_service(handle);

        let started = tokio::time::Instant::now();
        let outcome = coordinator
            .shutdown_or_force(ShutdownReason::Signal("SIGTERM"), async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ShutdownReason::Signal("SIGINT")
            })
            .await;

        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert_eq!(outcome.exit_code(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(runtime);
    }

    #[tokio::test]
    async fn test_teardown_wins_when_no_second_signal() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(200));
        let resource = Arc::new(CountingResource::default());
        coordinator.register_resource(resource.clone());

        let outcome = coordinator
            .shutdown_or_force(ShutdownReason::Signal("SIGTERM"), std::future::pending())
            .await;

        assert_eq!(outcome, ShutdownOutcome::Clean);
        assert_eq!(resource.releases(), 1);
    }
}
