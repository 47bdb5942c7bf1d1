use crate::models::BatchStatus;
use serde::Serialize;

/// 审计事件 (不透明的结构化事件, 交由外部审计日志存储)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    BatchStarted {
        batch_id: String,
        total_records: usize,
    },
    BatchFinished {
        batch_id: String,
        status: BatchStatus,
        processed_records: usize,
        invalid_records: usize,
        error_count: usize,
    },
    BatchFailed {
        batch_id: String,
        code: String,
        message: String,
    },
    RecordRevalidated {
        batch_id: String,
        record_id: String,
        result_count: usize,
    },
    ResultsCleared {
        record_ids: Vec<String>,
        records_removed: usize,
        alerts_removed: usize,
    },
    AlertsAcknowledged {
        count: usize,
    },
    AlertDismissed {
        alert_id: String,
    },
    ConfigUpdated,
    ConfigReset,
}

/// 审计事件接收方; 失败不影响校验流程
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), String>;
}

/// 以 tracing 结构化日志输出审计事件
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), String> {
        let payload = serde_json::to_string(event).map_err(|e| e.to_string())?;
        tracing::info!(target: "audit", "{}", payload);
        Ok(())
    }
}

/// 投递审计事件, 失败只记录警告
pub fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    if let Err(e) = sink.record(&event) {
        tracing::warn!("Audit sink rejected event {:?}: {}", event, e);
    }
}
