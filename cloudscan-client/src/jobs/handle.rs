use cloudscan_model::JobId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::infra::storage::{HandleSlot, HandleStoreError};

/// Persistent record of the job currently being tracked
///
/// Written when a job is accepted, cleared when it is observed terminal or
/// the user resets. A non-empty handle therefore always names a job this
/// client submitted and has not yet seen finish.
///
/// Clones share one lock, so a conditional clear never interleaves with a
/// write of a newer job.
#[derive(Debug, Clone)]
pub struct JobHandleStore {
    slot: Arc<dyn HandleSlot>,
    lock: Arc<Mutex<()>>,
}

impl JobHandleStore {
    pub fn new(slot: Arc<dyn HandleSlot>) -> Self {
        Self {
            slot,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Durably record `job_id`, replacing any previous handle
    pub async fn write(&self, job_id: &JobId) -> Result<(), HandleStoreError> {
        let _guard = self.lock.lock().await;
        self.slot.store(job_id.as_str()).await?;
        debug!("[JobHandle] Persisted active job {}", job_id);
        Ok(())
    }

    pub async fn read(&self) -> Result<Option<JobId>, HandleStoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn load(&self) -> Result<Option<JobId>, HandleStoreError> {
        let Some(raw) = self.slot.load().await? else {
            return Ok(None);
        };
        match JobId::new(raw) {
            Ok(job_id) => Ok(Some(job_id)),
            Err(err) => {
                warn!("[JobHandle] Ignoring unusable stored handle: {}", err);
                Ok(None)
            }
        }
    }

    pub async fn clear(&self) -> Result<(), HandleStoreError> {
        let _guard = self.lock.lock().await;
        self.remove().await
    }

    async fn remove(&self) -> Result<(), HandleStoreError> {
        self.slot.remove().await?;
        debug!("[JobHandle] Cleared active job handle");
        Ok(())
    }

    /// Clear the handle only if it still names `job_id`. Returns whether the
    /// slot was emptied.
    pub async fn clear_for(
        &self,
        job_id: &JobId,
    ) -> Result<bool, HandleStoreError> {
        let _guard = self.lock.lock().await;
        match self.load().await? {
            Some(stored) if &stored == job_id => {
                self.remove().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
