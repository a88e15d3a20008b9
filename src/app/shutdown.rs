use super::{ApplybotOrchestrator, ComponentState};
use crate::error::{ApplybotError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

impl ApplybotOrchestrator {
    /// Stop all components in reverse start order. Returns 1 if any
    /// component failed to stop cleanly.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Also stops the admin server and the shutdown watcher
        self.cancellation_token.cancel();

        let stop_timeout = Duration::from_secs(self.config.system.shutdown_timeout_seconds);
        let mut exit_code = 0;

        if self.get_component_state("admin").is_some() {
            let task = self.admin_task.take();
            if let Err(e) = self.stop_component("admin", join_task(task), stop_timeout).await {
                error!("Error stopping admin: {}", e);
                exit_code = 1;
            }
        }

        let supervisor = self.supervisor.clone();
        if let Err(e) = self
            .stop_component("supervisor", supervisor.stop(stop_timeout), stop_timeout * 2)
            .await
        {
            error!("Error stopping supervisor: {}", e);
            exit_code = 1;
        }

        if let Some(task) = self.notifier_task.take() {
            task.abort();
        }
        self.set_component_state("notifier", ComponentState::Stopped);

        // Last, so decisions made during shutdown are still mirrored
        let dispatcher = self.mirror_dispatcher.clone();
        if let Err(e) = self
            .stop_component("mirror", dispatcher.stop(stop_timeout), stop_timeout * 2)
            .await
        {
            error!("Error stopping mirror: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component<F>(&self, component: &str, stop: F, limit: Duration) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping);

        match timeout(limit, stop).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped);
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed);
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed);
                Err(ApplybotError::system(format!(
                    "{} component stop timeout",
                    component
                )))
            }
        }
    }
}

async fn join_task(task: Option<JoinHandle<()>>) -> Result<()> {
    if let Some(task) = task {
        if let Err(e) = task.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }
    Ok(())
}
