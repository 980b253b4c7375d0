//! Committer mapping store backed by a JSON Lines file.

use async_trait::async_trait;
use commitci_core::{CommitterRecord, Error, MappingStore, Result, TaskId};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Appends one JSON object per line; nothing is ever rewritten.
pub struct FileMappingStore {
    path: PathBuf,
    // Serialises appends from concurrently finishing attempts.
    write_lock: Mutex<()>,
}

impl FileMappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Read every record back, keyed by task id. Later lines win.
    pub async fn load(&self) -> Result<HashMap<TaskId, CommitterRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = HashMap::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CommitterRecord = serde_json::from_str(line).map_err(|e| {
                Error::Storage(format!(
                    "{}:{}: {}",
                    self.path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            records.insert(record.task_id.clone(), record);
        }
        Ok(records)
    }
}

#[async_trait]
impl MappingStore for FileMappingStore {
    async fn append(&self, record: &CommitterRecord) -> Result<()> {
        let mut line =
            serde_json::to_string(record).map_err(|e| Error::Storage(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(task_id = %record.task_id, path = %self.path.display(), "Committer record appended");
        Ok(())
    }
}
