use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApplybotError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: missing required fields: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    #[error("Application not found: {id}")]
    NotFound { id: String },

    #[error("Invalid decision: '{value}' (expected approved or rejected)")]
    InvalidDecision { value: String },

    #[error("Application {id} has already been {status}")]
    AlreadyDecided { id: String, status: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ApplybotError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }
}

/// Message bus (Telegram Bot API) session errors
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("Bot credential rejected: {details}")]
    InvalidCredential { details: String },

    #[error("Transport failure: {details}")]
    Transport { details: String },

    #[error("Bot API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("Another poller holds the session: {details}")]
    Conflict { details: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Malformed response: {details}")]
    MalformedResponse { details: String },

    #[error("Session closed")]
    Closed,
}

impl ConnectionError {
    /// Only a rejected credential is fatal; everything else is retried
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ConnectionError::InvalidCredential { .. })
    }
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Record not found: {id}")]
    Missing { id: String },

    #[error("Storage backend failure: {details}")]
    Backend { details: String },

    #[error("Corrupt store file {path}: {details}")]
    Corrupt { path: String, details: String },
}

#[derive(Error, Debug, Clone)]
pub enum MirrorError {
    #[error("Mirror request failed: {details}")]
    Request { details: String },

    #[error("Mirror rejected update with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Mirror queue is full")]
    QueueFull,

    #[error("Mirror dispatcher is closed")]
    DispatcherClosed,
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ApplybotError>;
