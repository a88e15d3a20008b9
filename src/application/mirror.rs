use super::model::ApplicationStatus;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::events::{ApplybotEvent, EventBus};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Best-effort external copy of application statuses
#[async_trait]
pub trait SpreadsheetMirror: Send + Sync {
    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> std::result::Result<(), MirrorError>;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Build the mirror selected by configuration
pub fn build_mirror(config: &MirrorConfig) -> Result<Arc<dyn SpreadsheetMirror>> {
    match (config.enabled, config.endpoint.as_deref()) {
        (true, Some(endpoint)) if !endpoint.is_empty() => {
            info!("Spreadsheet mirroring enabled via {}", endpoint);
            Ok(Arc::new(WebhookMirror::new(
                endpoint.to_string(),
                Duration::from_secs(config.timeout_seconds),
            )?))
        }
        _ => {
            info!("Spreadsheet mirroring disabled");
            Ok(Arc::new(DisabledMirror))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate<'a> {
    application_id: &'a str,
    status: ApplicationStatus,
    updated_at: String,
}

/// Posts status updates as JSON to a spreadsheet web hook
pub struct WebhookMirror {
    endpoint: String,
    http_client: reqwest::Client,
}

impl WebhookMirror {
    pub fn new(endpoint: String, request_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("applybot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MirrorError::Request {
                details: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            endpoint,
            http_client,
        })
    }
}

#[async_trait]
impl SpreadsheetMirror for WebhookMirror {
    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> std::result::Result<(), MirrorError> {
        let body = StatusUpdate {
            application_id,
            status,
            updated_at: Utc::now().to_rfc3339(),
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| MirrorError::Request {
                details: e.to_string(),
            })?;

        let code = response.status();
        if !code.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::Rejected {
                status: code.as_u16(),
                body,
            });
        }

        debug!("Mirrored {} -> {}", application_id, status);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Mirror used when no spreadsheet is configured
pub struct DisabledMirror;

#[async_trait]
impl SpreadsheetMirror for DisabledMirror {
    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> std::result::Result<(), MirrorError> {
        debug!(
            "Mirroring disabled, skipping {} -> {}",
            application_id, status
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

enum MirrorJob {
    Update {
        application_id: String,
        status: ApplicationStatus,
    },
    Flush(oneshot::Sender<()>),
}

/// Queue in front of the mirror. Jobs run one at a time in enqueue order on
/// a worker task; failures are logged and published, never returned.
pub struct MirrorDispatcher {
    sender: parking_lot::Mutex<Option<mpsc::Sender<MirrorJob>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    event_bus: Arc<EventBus>,
}

impl MirrorDispatcher {
    /// Spawn the worker task
    pub fn start(
        mirror: Arc<dyn SpreadsheetMirror>,
        event_bus: Arc<EventBus>,
        queue_capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::spawn(Self::run_worker(mirror, Arc::clone(&event_bus), receiver));

        Self {
            sender: parking_lot::Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            event_bus,
        }
    }

    async fn run_worker(
        mirror: Arc<dyn SpreadsheetMirror>,
        event_bus: Arc<EventBus>,
        mut receiver: mpsc::Receiver<MirrorJob>,
    ) {
        debug!("Mirror worker started ({})", mirror.name());

        while let Some(job) = receiver.recv().await {
            match job {
                MirrorJob::Update {
                    application_id,
                    status,
                } => match mirror.update_status(&application_id, status).await {
                    Ok(()) => {
                        debug!("Spreadsheet updated: {} -> {}", application_id, status);
                    }
                    Err(e) => {
                        let _ = event_bus.publish(ApplybotEvent::MirrorFailed {
                            application_id,
                            error: e.to_string(),
                        });
                    }
                },
                MirrorJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        debug!("Mirror worker stopped");
    }

    /// Queue a status update. Never blocks and never fails the caller; a
    /// rejected job is reported as `MirrorFailed`.
    pub fn dispatch(&self, application_id: &str, status: ApplicationStatus) {
        if let Err(e) = self.enqueue(application_id, status) {
            warn!(
                "Dropping spreadsheet update {} -> {}: {}",
                application_id, status, e
            );
            let _ = self.event_bus.publish(ApplybotEvent::MirrorFailed {
                application_id: application_id.to_string(),
                error: e.to_string(),
            });
        }
    }

    fn enqueue(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> std::result::Result<(), MirrorError> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(MirrorError::DispatcherClosed)?;

        let job = MirrorJob::Update {
            application_id: application_id.to_string(),
            status,
        };

        sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MirrorError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => MirrorError::DispatcherClosed,
        })
    }

    /// Wait until every job queued before this call has been processed
    pub async fn flush(&self) {
        let sender = self.sender.lock().clone();
        if let Some(sender) = sender {
            let (done_tx, done_rx) = oneshot::channel();
            if sender.send(MirrorJob::Flush(done_tx)).await.is_ok() {
                let _ = done_rx.await;
            }
        }
    }

    /// Close the queue and let the worker drain it
    pub async fn stop(&self, drain_timeout: Duration) -> Result<()> {
        self.sender.lock().take();

        let worker = self.worker.lock().await.take();
        if let Some(mut worker) = worker {
            if timeout(drain_timeout, &mut worker).await.is_err() {
                error!(
                    "Mirror worker did not drain within {:?}, aborting",
                    drain_timeout
                );
                worker.abort();
            }
        }

        info!("Mirror dispatcher stopped");
        Ok(())
    }
}
