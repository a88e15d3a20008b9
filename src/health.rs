use crate::bot::{ConnectionHealthSnapshot, ConnectionSupervisor};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const POLLING_INACTIVE_MESSAGE: &str = "Bot polling is not active";

/// Anything that can report the bot's connection health
pub trait StatusSource: Send + Sync {
    fn connection_status(&self) -> Result<ConnectionHealthSnapshot>;
}

impl StatusSource for ConnectionSupervisor {
    fn connection_status(&self) -> Result<ConnectionHealthSnapshot> {
        Ok(self.get_status())
    }
}

/// Overall health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotHealth {
    pub is_polling_active: bool,
    pub polling_started: Option<DateTime<Utc>>,
    pub reconnect_attempts: u32,
    /// Whole seconds, e.g. `"42s"`
    pub time_since_last_message: String,
}

impl From<&ConnectionHealthSnapshot> for BotHealth {
    fn from(snapshot: &ConnectionHealthSnapshot) -> Self {
        Self {
            is_polling_active: snapshot.is_polling_active,
            polling_started: snapshot.polling_started,
            reconnect_attempts: snapshot.reconnect_attempts,
            time_since_last_message: format!("{}s", snapshot.time_since_last_message.as_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub timestamp: DateTime<Utc>,
    pub bot: Option<BotHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    fn error(detail: String) -> Self {
        Self {
            status: HealthState::Error,
            timestamp: Utc::now(),
            bot: None,
            message: None,
            error: Some(detail),
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self.status {
            HealthState::Ok | HealthState::Warning => 200,
            HealthState::Error => 500,
        }
    }
}

/// Turns the supervisor's snapshot into an ok / warning / error report
#[derive(Clone)]
pub struct HealthReporter {
    source: Option<Arc<dyn StatusSource>>,
    stale_after: Duration,
}

impl HealthReporter {
    pub fn new(source: Option<Arc<dyn StatusSource>>, stale_after: Duration) -> Self {
        Self {
            source,
            stale_after,
        }
    }

    /// Produce a report. Never fails: problems become an `error` report.
    pub fn report(&self) -> HealthReport {
        let snapshot = match &self.source {
            None => None,
            Some(source) => match source.connection_status() {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    error!("Failed to read connection status: {}", e);
                    return HealthReport::error(e.to_string());
                }
            },
        };

        let report = evaluate(snapshot.as_ref(), self.stale_after);
        debug!("Health report: {:?}", report.status);
        report
    }
}

/// Warning only when polling is down and nothing has arrived for longer than
/// `stale_after`; a quiet but connected bot is healthy.
pub fn evaluate(snapshot: Option<&ConnectionHealthSnapshot>, stale_after: Duration) -> HealthReport {
    let Some(snapshot) = snapshot else {
        return HealthReport {
            status: HealthState::Ok,
            timestamp: Utc::now(),
            bot: None,
            message: None,
            error: None,
        };
    };

    let stale = !snapshot.is_polling_active && snapshot.time_since_last_message > stale_after;

    HealthReport {
        status: if stale {
            HealthState::Warning
        } else {
            HealthState::Ok
        },
        timestamp: Utc::now(),
        bot: Some(BotHealth::from(snapshot)),
        message: stale.then(|| POLLING_INACTIVE_MESSAGE.to_string()),
        error: None,
    }
}
