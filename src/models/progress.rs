use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 批次状态: idle → preparing → validating → {completed | failed | cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Idle,
    Preparing,
    Validating,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }

    /// 合法的状态迁移
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, Validating)
                | (Preparing, Failed)
                | (Preparing, Cancelled)
                | (Validating, Validating)
                | (Validating, Completed)
                | (Validating, Failed)
                | (Validating, Cancelled)
        )
    }
}

/// 批次进度 (仅在一次批次调用内有效)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub batch_id: String,
    pub total_records: usize,
    pub processed_records: usize,
    pub progress_percentage: u8,
    pub status: BatchStatus,
    pub current_step: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Progress {
    pub fn new(batch_id: &str, total_records: usize, now: DateTime<Utc>) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            total_records,
            processed_records: 0,
            progress_percentage: 0,
            status: BatchStatus::Idle,
            current_step: "idle".to_string(),
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// 推进状态; 非法迁移会被忽略并返回 false
    pub fn advance(&mut self, status: BatchStatus, step: impl Into<String>, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(status) {
            tracing::warn!(
                "Batch {}: 忽略非法状态迁移 {:?} -> {:?}",
                self.batch_id, self.status, status
            );
            return false;
        }
        self.status = status;
        self.current_step = step.into();
        self.updated_at = now;
        if status.is_terminal() {
            self.completed_at = Some(now);
        }
        if status == BatchStatus::Completed {
            self.processed_records = self.total_records;
            self.progress_percentage = 100;
        }
        true
    }

    pub fn record_processed(&mut self, processed: usize, now: DateTime<Utc>) {
        self.processed_records = processed.min(self.total_records);
        self.progress_percentage = percentage(self.processed_records, self.total_records);
        self.updated_at = now;
    }
}

fn percentage(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed * 100) / total).min(100) as u8
}
