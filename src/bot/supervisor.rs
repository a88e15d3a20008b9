use super::snapshot::{ConnectionHealthSnapshot, SnapshotCell};
use super::transport::{MessageBus, MessageHandler};
use super::types::InboundMessage;
use crate::config::ApplybotConfig;
use crate::error::{ConnectionError, Result};
use crate::events::{ApplybotEvent, EventBus};
use crate::recovery::{RecoveryAction, RecoveryConfig, RecoveryManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keeps one long-poll session to the message bus alive, reconnecting with
/// exponential backoff, and hands every inbound message to a dispatch worker.
///
/// The poll loop is a single task, so there is never more than one session
/// or reconnect attempt in flight.
pub struct ConnectionSupervisor {
    bus: Arc<dyn MessageBus>,
    handler: Arc<dyn MessageHandler>,
    event_bus: Arc<EventBus>,
    recovery_config: RecoveryConfig,
    poll_timeout: Duration,
    snapshot: Arc<SnapshotCell>,
    started: AtomicBool,
    cancellation_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        handler: Arc<dyn MessageHandler>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            bus,
            handler,
            event_bus,
            recovery_config: RecoveryConfig::default(),
            poll_timeout: Duration::from_secs(30),
            snapshot: Arc::new(SnapshotCell::new()),
            started: AtomicBool::new(false),
            cancellation_token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Build a supervisor using the bot and reconnect sections of `config`
    pub fn from_config(
        config: &ApplybotConfig,
        bus: Arc<dyn MessageBus>,
        handler: Arc<dyn MessageHandler>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(bus, handler, event_bus)
            .with_recovery_config(RecoveryConfig::from(&config.reconnect))
            .with_poll_timeout(config.bot.poll_timeout())
    }

    pub fn with_recovery_config(mut self, recovery_config: RecoveryConfig) -> Self {
        self.recovery_config = recovery_config;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Establish the session and spawn the poll loop.
    ///
    /// Returns an error only when the credential is rejected on the first
    /// connect. Any other first-connect failure is retried in the background.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Connection supervisor already started");
            return Ok(());
        }

        info!("Starting connection supervisor");
        self.snapshot.mark_connecting();

        let mut recovery = RecoveryManager::with_config(self.recovery_config.clone());

        let pending_error = match self.bus.connect().await {
            Ok(identity) => {
                info!("Bot connected as {}", identity.handle());
                self.snapshot.mark_connected();
                publish_connection_status(&self.event_bus, true);
                None
            }
            Err(e) if !e.is_recoverable() => {
                error!("Bot connection rejected: {}", e);
                self.snapshot.mark_disconnected();
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
            Err(e) => {
                warn!("Initial bot connection failed, will keep retrying: {}", e);
                let attempts = recovery.record_failure();
                self.snapshot.mark_failed_attempt(attempts);
                Some(e)
            }
        };

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let dispatch_task = tokio::spawn(run_dispatch_worker(
            Arc::clone(&self.handler),
            dispatch_rx,
        ));

        let poll_loop = PollLoop {
            bus: Arc::clone(&self.bus),
            event_bus: Arc::clone(&self.event_bus),
            snapshot: Arc::clone(&self.snapshot),
            poll_timeout: self.poll_timeout,
            cancellation_token: self.cancellation_token.clone(),
            recovery,
            dispatch_tx,
        };
        let poll_task = tokio::spawn(poll_loop.run(pending_error));

        let mut tasks = self.tasks.lock().await;
        tasks.push(poll_task);
        tasks.push(dispatch_task);

        Ok(())
    }

    /// Current connection health. Never blocks on I/O.
    pub fn get_status(&self) -> ConnectionHealthSnapshot {
        self.snapshot.read()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Cancel polling and any pending backoff, then wait for the tasks
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        info!("Stopping connection supervisor");
        self.cancellation_token.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for mut task in tasks {
            if tokio::time::timeout(timeout, &mut task).await.is_err() {
                warn!(
                    "Supervisor task did not finish within {:?}, aborting",
                    timeout
                );
                task.abort();
            }
        }

        let was_active = self.snapshot.read().is_polling_active;
        self.snapshot.mark_disconnected();
        if was_active {
            publish_connection_status(&self.event_bus, false);
        }

        info!("Connection supervisor stopped");
        Ok(())
    }
}

fn publish_connection_status(event_bus: &EventBus, connected: bool) {
    let _ = event_bus.publish(ApplybotEvent::ConnectionStatusChanged {
        connected,
        timestamp: SystemTime::now(),
    });
}

async fn run_dispatch_worker(
    handler: Arc<dyn MessageHandler>,
    mut receiver: mpsc::UnboundedReceiver<InboundMessage>,
) {
    debug!("Message dispatch worker started");

    while let Some(message) = receiver.recv().await {
        handler.handle(message).await;
    }

    debug!("Message dispatch worker stopped");
}

/// State owned by the poll task
struct PollLoop {
    bus: Arc<dyn MessageBus>,
    event_bus: Arc<EventBus>,
    snapshot: Arc<SnapshotCell>,
    poll_timeout: Duration,
    cancellation_token: CancellationToken,
    recovery: RecoveryManager,
    dispatch_tx: mpsc::UnboundedSender<InboundMessage>,
}

impl PollLoop {
    async fn run(mut self, mut pending_error: Option<ConnectionError>) {
        let mut offset: Option<i64> = None;

        loop {
            if let Some(cause) = pending_error.take() {
                if !self.reconnect(cause).await {
                    break;
                }
            }

            let result = tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                result = self.bus.poll(offset, self.poll_timeout) => result,
            };

            match result {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if let Some(message) = update.message {
                            self.on_message(message);
                        }
                    }
                }
                Err(e) => {
                    self.on_disconnect(&e);
                    pending_error = Some(e);
                }
            }
        }

        debug!("Poll loop stopped");
    }

    fn on_message(&self, message: InboundMessage) {
        self.snapshot.touch();

        let _ = self.event_bus.publish(ApplybotEvent::MessageReceived {
            chat_id: message.chat_id,
            update_id: message.update_id,
            timestamp: SystemTime::now(),
        });

        if self.dispatch_tx.send(message).is_err() {
            warn!("Dispatch worker has exited, dropping message");
        }
    }

    fn on_disconnect(&self, cause: &ConnectionError) {
        warn!("Bot polling interrupted: {}", cause);
        self.snapshot.mark_disconnected();
        publish_connection_status(&self.event_bus, false);
    }

    /// Retry until a session is established. Returns false when the loop
    /// should exit, either on cancellation or on a fatal error.
    async fn reconnect(&mut self, mut cause: ConnectionError) -> bool {
        loop {
            let delay = match self.recovery.handle_error(&cause) {
                RecoveryAction::RetryAfterDelay(delay) => delay,
                RecoveryAction::Shutdown => {
                    self.on_fatal(&cause);
                    return false;
                }
            };

            let _ = self.event_bus.publish(ApplybotEvent::ReconnectScheduled {
                attempt: self.recovery.failed_attempts() + 1,
                delay_ms: delay.as_millis().try_into().unwrap_or(u64::MAX),
            });

            tokio::select! {
                _ = self.cancellation_token.cancelled() => return false,
                _ = sleep(delay) => {}
            }

            self.snapshot.mark_connecting();

            let result = tokio::select! {
                _ = self.cancellation_token.cancelled() => return false,
                result = self.bus.connect() => result,
            };

            match result {
                Ok(identity) => {
                    self.recovery.reset();
                    self.snapshot.mark_connected();
                    info!("Bot reconnected as {}", identity.handle());
                    publish_connection_status(&self.event_bus, true);
                    return true;
                }
                Err(e) => {
                    let attempts = self.recovery.record_failure();
                    self.snapshot.mark_failed_attempt(attempts);
                    warn!("Reconnect attempt {} failed: {}", attempts, e);
                    cause = e;
                }
            }
        }
    }

    fn on_fatal(&self, cause: &ConnectionError) {
        error!("Bot connection failed permanently: {}", cause);
        self.snapshot.mark_disconnected();

        let _ = self.event_bus.publish(ApplybotEvent::SystemError {
            component: "connection_supervisor".to_string(),
            error: cause.to_string(),
        });
        let _ = self.event_bus.publish(ApplybotEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: format!("Bot connection failed: {}", cause),
        });
    }
}
