use super::model::{Application, ApplicationStatus, NewApplication};
use crate::config::{StoreBackend, StoreConfig};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Durable keyed storage for applications
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Persist a new pending application and return it with its assigned id
    async fn create(&self, application: NewApplication) -> std::result::Result<Application, StoreError>;

    /// All applications, newest first
    async fn get_all(&self) -> std::result::Result<Vec<Application>, StoreError>;

    async fn get_by_id(&self, id: &str) -> std::result::Result<Option<Application>, StoreError>;

    /// The single mutation path for an existing application
    async fn update_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        admin_notes: Option<String>,
    ) -> std::result::Result<Application, StoreError>;
}

/// Build the store selected by configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn ApplicationStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory application store");
            Ok(Arc::new(MemoryApplicationStore::new()))
        }
        StoreBackend::File => {
            let store = FileApplicationStore::open(&config.path).await?;
            Ok(Arc::new(store))
        }
    }
}

fn sorted_newest_first(records: &HashMap<String, Application>) -> Vec<Application> {
    let mut applications: Vec<Application> = records.values().cloned().collect();
    applications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    applications
}

fn apply_status(
    record: &mut Application,
    status: ApplicationStatus,
    admin_notes: Option<String>,
) {
    record.status = status;
    record.admin_notes = admin_notes;
    record.updated_at = Utc::now();
}

/// Process-local store, used for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryApplicationStore {
    records: RwLock<HashMap<String, Application>>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn create(&self, application: NewApplication) -> std::result::Result<Application, StoreError> {
        let record = application.into_application(Uuid::new_v4().to_string(), Utc::now());
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_all(&self) -> std::result::Result<Vec<Application>, StoreError> {
        Ok(sorted_newest_first(&*self.records.read().await))
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<Option<Application>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        admin_notes: Option<String>,
    ) -> std::result::Result<Application, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| StoreError::Missing {
            id: id.to_string(),
        })?;
        apply_status(record, status, admin_notes);
        Ok(record.clone())
    }
}

/// JSON file store. Every mutation rewrites the file through a temp file
/// and rename, so a crash leaves either the old or the new contents.
pub struct FileApplicationStore {
    path: PathBuf,
    records: RwLock<HashMap<String, Application>>,
}

impl FileApplicationStore {
    /// Open the store, loading existing records if the file exists
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| StoreError::Backend {
                    details: format!("{}: {}", parent.display(), e),
                })?;
                info!("Created store directory: {}", parent.display());
            }
        }

        let records = if path.exists() {
            let raw = fs::read(&path).await.map_err(|e| StoreError::Backend {
                details: format!("{}: {}", path.display(), e),
            })?;
            if raw.iter().all(u8::is_ascii_whitespace) {
                HashMap::new()
            } else {
                let list: Vec<Application> =
                    serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
                        path: path.display().to_string(),
                        details: e.to_string(),
                    })?;
                list.into_iter().map(|a| (a.id.clone(), a)).collect()
            }
        } else {
            HashMap::new()
        };

        info!(
            "Opened application store at {} ({} records)",
            path.display(),
            records.len()
        );

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &HashMap<String, Application>) -> std::result::Result<(), StoreError> {
        let backend = |e: std::io::Error| StoreError::Backend {
            details: format!("{}: {}", self.path.display(), e),
        };

        let json = serde_json::to_vec_pretty(&sorted_newest_first(records)).map_err(|e| {
            StoreError::Backend {
                details: e.to_string(),
            }
        })?;

        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        fs::write(&tmp_path, json).await.map_err(backend)?;
        fs::rename(&tmp_path, &self.path).await.map_err(backend)?;

        debug!("Persisted {} applications", records.len());
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for FileApplicationStore {
    async fn create(&self, application: NewApplication) -> std::result::Result<Application, StoreError> {
        let record = application.into_application(Uuid::new_v4().to_string(), Utc::now());

        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record.clone());

        if let Err(e) = self.persist(&records).await {
            records.remove(&record.id);
            warn!("Failed to persist new application: {}", e);
            return Err(e);
        }

        Ok(record)
    }

    async fn get_all(&self) -> std::result::Result<Vec<Application>, StoreError> {
        Ok(sorted_newest_first(&*self.records.read().await))
    }

    async fn get_by_id(&self, id: &str) -> std::result::Result<Option<Application>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        admin_notes: Option<String>,
    ) -> std::result::Result<Application, StoreError> {
        let mut records = self.records.write().await;

        let previous = records.get(id).cloned().ok_or_else(|| StoreError::Missing {
            id: id.to_string(),
        })?;

        let mut updated = previous.clone();
        apply_status(&mut updated, status, admin_notes);
        records.insert(id.to_string(), updated.clone());

        if let Err(e) = self.persist(&records).await {
            records.insert(id.to_string(), previous);
            warn!("Failed to persist status of {}: {}", id, e);
            return Err(e);
        }

        Ok(updated)
    }
}
