//! Committer mapping storage abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, TaskId};

/// Association between a completed build and the person whose commit
/// triggered it. Consumed by external reporting, never by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitterRecord {
    pub task_id: TaskId,
    pub committer_email: String,
    pub component: String,
    pub recorded_at: DateTime<Utc>,
}

impl CommitterRecord {
    pub fn new(
        task_id: TaskId,
        committer_email: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            committer_email: committer_email.into(),
            component: component.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only store for committer records.
///
/// Duplicate task ids are not expected; if they occur the later record wins.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn append(&self, record: &CommitterRecord) -> Result<()>;
}
