use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Lifecycle of the long-poll session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Active,
}

/// Point-in-time view of the supervisor's connection health
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionHealthSnapshot {
    pub state: ConnectionState,
    pub is_polling_active: bool,
    pub polling_started: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    pub time_since_last_message: Duration,
}

#[derive(Debug, Clone)]
struct SnapshotState {
    state: ConnectionState,
    is_polling_active: bool,
    polling_started: Option<DateTime<Utc>>,
    reconnect_attempts: u32,
    last_activity: Instant,
}

/// Shared snapshot storage. Each transition replaces the fields it owns under
/// one short write lock, so readers never see a half-applied transition.
#[derive(Debug)]
pub(crate) struct SnapshotCell {
    inner: RwLock<SnapshotState>,
}

impl SnapshotCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(SnapshotState {
                state: ConnectionState::Disconnected,
                is_polling_active: false,
                polling_started: None,
                reconnect_attempts: 0,
                last_activity: Instant::now(),
            }),
        }
    }

    pub(crate) fn mark_connecting(&self) {
        self.inner.write().state = ConnectionState::Connecting;
    }

    pub(crate) fn mark_connected(&self) {
        let mut inner = self.inner.write();
        inner.state = ConnectionState::Active;
        inner.is_polling_active = true;
        inner.polling_started = Some(Utc::now());
        inner.reconnect_attempts = 0;
    }

    pub(crate) fn mark_disconnected(&self) {
        let mut inner = self.inner.write();
        inner.state = ConnectionState::Disconnected;
        inner.is_polling_active = false;
    }

    pub(crate) fn mark_failed_attempt(&self, attempts: u32) {
        let mut inner = self.inner.write();
        inner.state = ConnectionState::Disconnected;
        inner.is_polling_active = false;
        inner.reconnect_attempts = attempts;
    }

    pub(crate) fn touch(&self) {
        self.inner.write().last_activity = Instant::now();
    }

    pub(crate) fn read(&self) -> ConnectionHealthSnapshot {
        let inner = self.inner.read().clone();
        ConnectionHealthSnapshot {
            state: inner.state,
            is_polling_active: inner.is_polling_active,
            polling_started: inner.polling_started,
            reconnect_attempts: inner.reconnect_attempts,
            time_since_last_message: inner.last_activity.elapsed(),
        }
    }
}
