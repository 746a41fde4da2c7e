use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Graceful shutdown coordinator
pub struct GracefulShutdown {
    components: Arc<Mutex<Vec<ShutdownComponent>>>,
    component_timeout: Duration,
}

/// Type alias for shutdown function result
pub type ShutdownResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Type alias for shutdown function
type ShutdownFn = Box<dyn Fn() -> tokio::task::JoinHandle<ShutdownResult> + Send + Sync>;

/// A component that needs to be shut down gracefully
struct ShutdownComponent {
    name: String,
    shutdown_fn: ShutdownFn,
}

/// How a single component finished shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentOutcome {
    Completed,
    Failed,
    Panicked,
    TimedOut,
}

impl GracefulShutdown {
    /// `component_timeout` bounds how long each component may take
    pub fn new(component_timeout: Duration) -> Self {
        Self {
            components: Arc::new(Mutex::new(Vec::new())),
            component_timeout,
        }
    }

    /// Register a component for graceful shutdown
    pub async fn register_component<F, Fut>(&self, name: impl Into<String>, shutdown_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ShutdownResult> + Send + 'static,
    {
        let component = ShutdownComponent {
            name: name.into(),
            shutdown_fn: Box::new(move || {
                let fut = shutdown_fn();
                tokio::spawn(fut)
            }),
        };

        self.components.lock().await.push(component);
    }

    /// Shut down every registered component concurrently and report how each
    /// one finished, in registration order
    pub async fn shutdown(&self) -> Vec<(String, ComponentOutcome)> {
        info!("Initiating graceful shutdown...");

        let components = self.components.lock().await;
        let mut handles = Vec::new();

        for component in components.iter() {
            info!("Shutting down component: {}", component.name);
            let handle = (component.shutdown_fn)();
            handles.push((component.name.clone(), handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let outcome = match timeout(self.component_timeout, handle).await {
                Ok(Ok(Ok(()))) => {
                    info!("Component '{}' shut down successfully", name);
                    ComponentOutcome::Completed
                }
                Ok(Ok(Err(e))) => {
                    error!("Component '{}' shutdown failed: {}", name, e);
                    ComponentOutcome::Failed
                }
                Ok(Err(e)) => {
                    error!("Component '{}' shutdown task panicked: {}", name, e);
                    ComponentOutcome::Panicked
                }
                Err(_) => {
                    warn!("Component '{}' shutdown timed out", name);
                    ComponentOutcome::TimedOut
                }
            };
            outcomes.push((name, outcome));
        }

        info!("Graceful shutdown completed");
        outcomes
    }
}
