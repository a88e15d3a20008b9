use super::mirror::MirrorDispatcher;
use super::model::{
    normalize_field_name, Application, ApplicationContent, ApplicationStats, ApplicationStatus,
    Decision, NewApplication, SubmitterIdentity,
};
use super::store::ApplicationStore;
use crate::config::ApplicationConfig;
use crate::error::{ApplybotError, Result, StoreError};
use crate::events::{ApplybotEvent, EventBus};
use crate::notify::NotificationSender;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

/// Turns submissions into store records and executes administrator
/// decisions: store write first and authoritative, mirror write queued after.
pub struct WorkflowCoordinator {
    store: Arc<dyn ApplicationStore>,
    mirror: Arc<MirrorDispatcher>,
    event_bus: Arc<EventBus>,
    notifications: Option<NotificationSender>,
    required_fields: Vec<String>,
    allow_redecide: bool,
    decision_locks: KeyedLocks,
}

impl WorkflowCoordinator {
    pub fn new(
        config: &ApplicationConfig,
        store: Arc<dyn ApplicationStore>,
        mirror: Arc<MirrorDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            mirror,
            event_bus,
            notifications: None,
            required_fields: config
                .required_fields
                .iter()
                .map(|f| normalize_field_name(f))
                .collect(),
            allow_redecide: config.allow_redecide,
            decision_locks: KeyedLocks::default(),
        }
    }

    /// Also deliver submissions and decisions to the notifier queue
    pub fn with_notifications(mut self, notifications: NotificationSender) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Validate and store a new pending application, returning its id
    pub async fn submit(
        &self,
        content: ApplicationContent,
        submitter: SubmitterIdentity,
    ) -> Result<String> {
        let content: ApplicationContent = content
            .into_iter()
            .map(|(k, v)| (normalize_field_name(&k), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        let missing: Vec<String> = self
            .required_fields
            .iter()
            .filter(|field| content.get(*field).map_or(true, |v| v.is_empty()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(ApplybotError::Validation { missing });
        }

        let summary = self.summarize(&content);
        let chat_id = submitter.chat_id;
        let display_name = submitter.display_name();

        let application = self
            .store
            .create(NewApplication { submitter, content })
            .await?;

        info!(
            "Application {} submitted by {}",
            application.id, display_name
        );

        self.announce(ApplybotEvent::ApplicationSubmitted {
            application_id: application.id.clone(),
            chat_id,
            summary,
        });

        Ok(application.id)
    }

    /// Apply an administrator decision.
    ///
    /// Fails only on an invalid decision, an unknown id, an already decided
    /// application (unless re-deciding is allowed) or a store failure. Mirror
    /// failures never reach the caller.
    pub async fn decide(
        &self,
        application_id: &str,
        decision: &str,
        admin_notes: Option<String>,
    ) -> Result<Application> {
        let decision: Decision = decision.parse()?;
        let status: ApplicationStatus = decision.into();
        let admin_notes = admin_notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());

        let _guard = self.decision_locks.lock(application_id).await;

        let current = self
            .store
            .get_by_id(application_id)
            .await?
            .ok_or_else(|| ApplybotError::not_found(application_id))?;

        if current.status.is_decided() && !self.allow_redecide {
            return Err(ApplybotError::AlreadyDecided {
                id: application_id.to_string(),
                status: current.status.to_string(),
            });
        }

        let updated = self
            .store
            .update_status(application_id, status, admin_notes)
            .await
            .map_err(|e| match e {
                StoreError::Missing { id } => ApplybotError::NotFound { id },
                other => {
                    error!("Failed to update status of {}: {}", application_id, other);
                    ApplybotError::Store(other)
                }
            })?;

        // Enqueued while the id is still locked, so mirror jobs for one id
        // follow store commit order.
        self.mirror.dispatch(application_id, status);

        info!("Application {} {}", application_id, status);

        self.announce(ApplybotEvent::ApplicationDecided {
            application_id: application_id.to_string(),
            chat_id: updated.submitter.chat_id,
            status,
            admin_notes: updated.admin_notes.clone(),
        });

        Ok(updated)
    }

    fn announce(&self, event: ApplybotEvent) {
        if let Some(notifications) = &self.notifications {
            if notifications.send(event.clone()).is_err() {
                warn!("Notifier has stopped, dropping {}", event.description());
            }
        }
        let _ = self.event_bus.publish(event);
    }

    pub async fn get(&self, application_id: &str) -> Result<Application> {
        self.store
            .get_by_id(application_id)
            .await?
            .ok_or_else(|| ApplybotError::not_found(application_id))
    }

    pub async fn list(&self) -> Result<Vec<Application>> {
        Ok(self.store.get_all().await?)
    }

    pub async fn stats(&self) -> Result<ApplicationStats> {
        let applications = self.store.get_all().await?;
        Ok(ApplicationStats::from_applications(&applications))
    }

    fn summarize(&self, content: &ApplicationContent) -> String {
        self.required_fields
            .iter()
            .filter_map(|field| content.get(field).map(|v| format!("{}: {}", field, v)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

type LockMap = Arc<parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per key, dropped from the map when nobody holds or awaits it
#[derive(Default)]
struct KeyedLocks {
    locks: LockMap,
}

struct KeyedGuard {
    key: String,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    async fn lock(&self, key: &str) -> KeyedGuard {
        let mutex = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        let guard = mutex.lock_owned().await;

        KeyedGuard {
            key: key.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.locks.lock();
        if locks
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
