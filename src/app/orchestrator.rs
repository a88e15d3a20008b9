use super::types::{ComponentState, ShutdownReason};
#[cfg(feature = "admin_panel")]
use crate::admin::AdminServer;
use crate::application::{build_mirror, open_store, MirrorDispatcher, WorkflowCoordinator};
use crate::bot::{ConnectionSupervisor, IntakeHandler, MessageBus, TelegramBotApi};
use crate::config::ApplybotConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::health::{HealthReporter, StatusSource};
use crate::notify::Notifier;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(super) type ShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

/// Main application coordinator that wires and manages all components
pub struct ApplybotOrchestrator {
    pub(super) config: ApplybotConfig,
    pub(super) event_bus: Arc<EventBus>,

    // Components
    pub(super) mirror_dispatcher: Arc<MirrorDispatcher>,
    pub(super) coordinator: Arc<WorkflowCoordinator>,
    pub(super) supervisor: Arc<ConnectionSupervisor>,
    pub(super) reporter: HealthReporter,
    #[cfg(feature = "admin_panel")]
    pub(super) admin_server: Option<Arc<AdminServer>>,
    pub(super) admin_enabled: bool,
    pub(super) notifier: Option<Notifier>,
    pub(super) notifier_task: Option<JoinHandle<()>>,
    pub(super) admin_task: Option<JoinHandle<()>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: ShutdownSender,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ApplybotOrchestrator {
    /// Create an orchestrator talking to the Telegram Bot API
    pub async fn new(config: ApplybotConfig) -> Result<Self> {
        let bus: Arc<dyn MessageBus> = Arc::new(TelegramBotApi::new(&config.bot)?);
        Self::with_bus(config, bus).await
    }

    /// Create an orchestrator on top of an existing message bus
    pub async fn with_bus(config: ApplybotConfig, bus: Arc<dyn MessageBus>) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let store = open_store(&config.store).await?;
        let mirror = build_mirror(&config.mirror)?;
        let mirror_dispatcher = Arc::new(MirrorDispatcher::start(
            mirror,
            Arc::clone(&event_bus),
            config.mirror.queue_capacity,
        ));

        let (notifier, notifications) = Notifier::new(Arc::clone(&bus), &config.bot);

        let coordinator = Arc::new(
            WorkflowCoordinator::new(
                &config.application,
                store,
                Arc::clone(&mirror_dispatcher),
                Arc::clone(&event_bus),
            )
            .with_notifications(notifications),
        );

        let handler = Arc::new(IntakeHandler::new(
            Arc::clone(&coordinator),
            Arc::clone(&bus),
        ));

        let supervisor = Arc::new(ConnectionSupervisor::from_config(
            &config,
            Arc::clone(&bus),
            handler,
            Arc::clone(&event_bus),
        ));

        let status_source: Arc<dyn StatusSource> = supervisor.clone();
        let reporter = HealthReporter::new(
            Some(status_source),
            Duration::from_secs(config.health.stale_after_seconds),
        );

        #[cfg(feature = "admin_panel")]
        let admin_server = Some(Arc::new(AdminServer::new(
            config.admin.clone(),
            Arc::clone(&coordinator),
            reporter.clone(),
        )));

        Ok(Self {
            config,
            event_bus,
            mirror_dispatcher,
            coordinator,
            supervisor,
            reporter,
            #[cfg(feature = "admin_panel")]
            admin_server,
            admin_enabled: cfg!(feature = "admin_panel"),
            notifier: Some(notifier),
            notifier_task: None,
            admin_task: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the admin HTTP server
    pub fn set_admin_enabled(&mut self, enabled: bool) {
        self.admin_enabled = enabled && cfg!(feature = "admin_panel");
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn coordinator(&self) -> Arc<WorkflowCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn health_reporter(&self) -> &HealthReporter {
        &self.reporter
    }

    /// Ask `run` to shut down; only the first request wins
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        send_shutdown(&self.shutdown_sender, reason)
    }

    /// Update component state
    pub fn set_component_state(&self, component: &str, state: ComponentState) {
        debug!("Component '{}' state changed to: {:?}", component, state);
        self.component_states
            .lock()
            .insert(component.to_string(), state);
    }

    pub fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().get(component).cloned()
    }

    pub fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().clone()
    }
}

pub(super) fn send_shutdown(sender: &ShutdownSender, reason: ShutdownReason) -> bool {
    match sender.lock().take() {
        Some(sender) => sender.send(reason).is_ok(),
        None => false,
    }
}
