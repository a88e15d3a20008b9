use super::orchestrator::send_shutdown;
use super::{ApplybotOrchestrator, ComponentState, ShutdownReason};
use crate::error::{EventBusError, Result};
use crate::events::{ApplybotEvent, EventFilter};
use std::sync::Arc;
use tracing::{error, info, warn};

impl ApplybotOrchestrator {
    /// Register all components as stopped
    pub fn initialize(&mut self) -> Result<()> {
        info!("Initializing applybot components");

        self.set_component_state("mirror", ComponentState::Stopped);
        self.set_component_state("notifier", ComponentState::Stopped);
        self.set_component_state("supervisor", ComponentState::Stopped);
        if self.admin_enabled {
            self.set_component_state("admin", ComponentState::Stopped);
        }

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all components. Fails if the bot credential is rejected or the
    /// admin address cannot be bound.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting applybot");

        for setting in self.config.missing_optional_settings() {
            warn!("{}", setting);
        }

        self.spawn_shutdown_watcher();

        // The dispatcher worker runs from construction
        self.set_component_state("mirror", ComponentState::Running);

        if let Some(notifier) = self.notifier.take() {
            self.set_component_state("notifier", ComponentState::Starting);
            self.notifier_task = Some(notifier.start());
            self.set_component_state("notifier", ComponentState::Running);
        }

        self.set_component_state("supervisor", ComponentState::Starting);
        if let Err(e) = self.supervisor.start().await {
            error!("Failed to start connection supervisor: {}", e);
            self.set_component_state("supervisor", ComponentState::Failed);
            return Err(e);
        }
        self.set_component_state("supervisor", ComponentState::Running);

        self.start_admin_server().await?;

        info!("Applybot started successfully");
        Ok(())
    }

    /// Forward `ShutdownRequested` events to the run loop
    fn spawn_shutdown_watcher(&self) {
        let mut receiver = self.event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown_watcher",
        );
        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(ApplybotEvent::ShutdownRequested { reason, .. }) => {
                        send_shutdown(&shutdown_sender, ShutdownReason::Fatal(reason));
                        break;
                    }
                    Ok(_) => {}
                    Err(EventBusError::Lagged { skipped }) => {
                        warn!("Shutdown watcher skipped {} events", skipped);
                    }
                    Err(_) => break,
                }
            }
        });
    }

    /// Bind the admin listener before returning, so an unavailable port
    /// fails startup. A later serve error requests a fatal shutdown.
    #[cfg(feature = "admin_panel")]
    async fn start_admin_server(&mut self) -> Result<()> {
        if !self.admin_enabled {
            return Ok(());
        }
        let Some(server) = self.admin_server.clone() else {
            return Ok(());
        };

        self.set_component_state("admin", ComponentState::Starting);

        let listener = match server.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to start admin server: {}", e);
                self.set_component_state("admin", ComponentState::Failed);
                return Err(e);
            }
        };

        self.set_component_state("admin", ComponentState::Running);
        let address = server.address();

        let token = self.cancellation_token.clone();
        let states = Arc::clone(&self.component_states);
        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        self.admin_task = Some(tokio::spawn(async move {
            if let Err(e) = server.serve(listener, token).await {
                error!("Admin server error: {}", e);
                states
                    .lock()
                    .insert("admin".to_string(), ComponentState::Failed);
                send_shutdown(&shutdown_sender, ShutdownReason::Fatal(e.to_string()));
            }
        }));

        info!("Admin server started on {}", address);
        Ok(())
    }

    #[cfg(not(feature = "admin_panel"))]
    async fn start_admin_server(&mut self) -> Result<()> {
        Ok(())
    }
}
