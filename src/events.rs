use crate::application::ApplicationStatus;
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the applybot system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApplybotEvent {
    /// A chat message arrived on the long-poll session
    MessageReceived {
        chat_id: i64,
        update_id: i64,
        timestamp: SystemTime,
    },
    /// A new application was stored with status pending
    ApplicationSubmitted {
        application_id: String,
        chat_id: i64,
        summary: String,
    },
    /// An administrator decision was committed to the store
    ApplicationDecided {
        application_id: String,
        chat_id: i64,
        status: ApplicationStatus,
        admin_notes: Option<String>,
    },
    /// The spreadsheet mirror rejected or failed an update
    MirrorFailed {
        application_id: String,
        error: String,
    },
    /// The message bus session went up or down
    ConnectionStatusChanged {
        connected: bool,
        timestamp: SystemTime,
    },
    /// A reconnect attempt was scheduled after a delay
    ReconnectScheduled { attempt: u32, delay_ms: u64 },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl ApplybotEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ApplybotEvent::MessageReceived {
                chat_id, update_id, ..
            } => format!("Message {} received from chat {}", update_id, chat_id),
            ApplybotEvent::ApplicationSubmitted { application_id, .. } => {
                format!("Application submitted: {}", application_id)
            }
            ApplybotEvent::ApplicationDecided {
                application_id,
                status,
                ..
            } => format!("Application {} {}", application_id, status),
            ApplybotEvent::MirrorFailed {
                application_id,
                error,
            } => format!("Mirror update for {} failed: {}", application_id, error),
            ApplybotEvent::ConnectionStatusChanged { connected, .. } => format!(
                "Bot {}",
                if *connected {
                    "connected"
                } else {
                    "disconnected"
                }
            ),
            ApplybotEvent::ReconnectScheduled { attempt, delay_ms } => {
                format!("Reconnect attempt {} in {} ms", attempt, delay_ms)
            }
            ApplybotEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            ApplybotEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ApplybotEvent::MessageReceived { .. } => "message_received",
            ApplybotEvent::ApplicationSubmitted { .. } => "application_submitted",
            ApplybotEvent::ApplicationDecided { .. } => "application_decided",
            ApplybotEvent::MirrorFailed { .. } => "mirror_failed",
            ApplybotEvent::ConnectionStatusChanged { .. } => "connection_status_changed",
            ApplybotEvent::ReconnectScheduled { .. } => "reconnect_scheduled",
            ApplybotEvent::SystemError { .. } => "system_error",
            ApplybotEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ApplybotEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ApplybotEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter and a name used in logs
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers; publishing with no subscribers is not an error.
    pub fn publish(&self, event: ApplybotEvent) -> Result<usize, EventBusError> {
        match &event {
            ApplybotEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            ApplybotEvent::MirrorFailed {
                application_id,
                error,
            } => {
                warn!(
                    "Spreadsheet mirror failed for {} (not critical): {}",
                    application_id, error
                );
            }
            ApplybotEvent::ConnectionStatusChanged { connected, .. } => {
                if *connected {
                    info!("Bot connected");
                } else {
                    warn!("Bot disconnected");
                }
            }
            ApplybotEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &ApplybotEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ApplybotEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<ApplybotEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<ApplybotEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
