pub mod app;
pub mod application;
pub mod bot;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod notify;
pub mod recovery;

#[cfg(feature = "admin_panel")]
pub mod admin;

pub use app::{ApplybotOrchestrator, ComponentState, ShutdownReason};
pub use application::{
    Application, ApplicationStats, ApplicationStatus, ApplicationStore, SpreadsheetMirror,
    WorkflowCoordinator,
};
pub use bot::{ConnectionHealthSnapshot, ConnectionState, ConnectionSupervisor, MessageBus};
pub use config::ApplybotConfig;
pub use error::{ApplybotError, Result};
pub use events::{ApplybotEvent, EventBus, EventFilter, EventReceiver};
pub use health::{HealthReport, HealthReporter, HealthState};
pub use notify::Notifier;
pub use recovery::{RecoveryAction, RecoveryConfig, RecoveryManager};

#[cfg(feature = "admin_panel")]
pub use admin::AdminServer;
