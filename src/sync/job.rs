// src/sync/job.rs

use crate::{
    models::{FetchMode, FetchOutcome, SourceTag, SyncCategory},
    utils,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub total: usize,
    pub processed: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub percent: u8,
}

impl SyncProgress {
    fn recalc_percent(&mut self) {
        self.percent = if self.total == 0 {
            0
        } else {
            ((self.processed.min(self.total) * 100) / self.total) as u8
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Ok,
    Skipped,
    Failed,
}

/// 单个文件的同步记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncItem {
    /// "ui" 或 "videos"
    pub kind: String,
    pub name: String,
    pub status: ItemStatus,
    /// remote | cache | config
    pub source: String,
    pub bytes: u64,
    pub error: Option<String>,
}

impl SyncItem {
    pub fn from_outcome(kind: &str, name: &str, outcome: FetchOutcome) -> Self {
        let (status, source, bytes) = match outcome {
            FetchOutcome::Downloaded { bytes } => (ItemStatus::Ok, SourceTag::Remote.as_str(), bytes),
            FetchOutcome::NotModified | FetchOutcome::Fresh => {
                (ItemStatus::Skipped, SourceTag::Cache.as_str(), 0)
            }
        };
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            status,
            source: source.to_string(),
            bytes,
            error: None,
        }
    }

    pub fn failed(kind: &str, name: &str, source: &str, error: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            status: ItemStatus::Failed,
            source: source.to_string(),
            bytes: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncJob {
    pub id: String,
    pub category: SyncCategory,
    pub force: bool,
    pub respect_ttl: bool,
    pub state: JobState,
    pub progress: SyncProgress,
    pub items: Vec<SyncItem>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncJob {
    pub fn new(category: SyncCategory, mode: FetchMode) -> Self {
        Self {
            id: utils::short_id(12),
            category,
            force: mode.force,
            respect_ttl: mode.respect_ttl,
            state: JobState::Pending,
            progress: SyncProgress::default(),
            items: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    pub fn mode(&self) -> FetchMode {
        FetchMode {
            force: self.force,
            respect_ttl: self.respect_ttl,
        }
    }

    /// 追加一条记录并更新计数
    pub fn record(&mut self, item: SyncItem) {
        match item.status {
            ItemStatus::Ok => self.progress.downloaded += 1,
            ItemStatus::Skipped => self.progress.skipped += 1,
            ItemStatus::Failed => {
                self.progress.failed += 1;
                self.last_error = item.error.clone();
            }
        }
        self.progress.processed += 1;
        self.progress.recalc_percent();
        self.items.push(item);
    }

    pub fn set_total(&mut self, total: usize) {
        self.progress.total = total;
        self.progress.recalc_percent();
    }
}
