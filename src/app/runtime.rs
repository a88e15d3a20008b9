use super::orchestrator::{send_shutdown, ShutdownSender};
use super::{ApplybotOrchestrator, ShutdownReason};
use crate::error::{ApplybotError, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

impl ApplybotOrchestrator {
    /// Run until a signal or a fatal event, then shut down. Returns the
    /// process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Applybot is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ApplybotError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| ApplybotError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let shutdown_code = self.shutdown().await?;
        let exit_code = shutdown_code.max(shutdown_reason.exit_code());

        info!("Applybot shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM (systemd stop), Unix only
        #[cfg(unix)]
        {
            let sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            send_shutdown(&sender, ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        let sender: ShutdownSender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(&sender, ShutdownReason::Signal("SIGINT".to_string()));
            }
        });
    }
}
