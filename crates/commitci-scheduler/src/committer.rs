//! Mapping from successful builds back to the committer who triggered them.

use commitci_core::{CommitterRecord, MappingStore, Result, TaskId};
use std::sync::Arc;
use tracing::info;

pub struct CommitterMapping {
    store: Arc<dyn MappingStore>,
    component: String,
}

impl CommitterMapping {
    pub fn new(store: Arc<dyn MappingStore>, component: impl Into<String>) -> Self {
        Self {
            store,
            component: component.into(),
        }
    }

    /// Append one record. Called once per successful attempt.
    pub async fn save(&self, task_id: &TaskId, committer_email: &str) -> Result<()> {
        let record = CommitterRecord::new(task_id.clone(), committer_email, &self.component);
        self.store.append(&record).await?;
        info!(
            component = %self.component,
            task_id = %task_id,
            committer = %committer_email,
            "Committer recorded"
        );
        Ok(())
    }
}
