use crate::error::ValidationError;
use crate::models::{
    Alert, InvoiceRecord, Progress, ValidationConfig, ValidationConfigPatch, ValidationResult,
    ValidationSummary,
};
use crate::service::audit::{self, AuditEvent, AuditSink, TracingAuditSink};
use crate::service::config_store::ConfigStore;
use crate::service::evaluator::FieldRegistry;
use crate::service::orchestrator::{BatchOptions, BatchOrchestrator, BatchOutcome, RevalidationOutcome};
use crate::store::{MutationStats, ValidationStore};
use chrono::Utc;
use std::sync::Arc;

/// 校验引擎: 配置、结果存储与编排器的显式上下文对象
pub struct ValidationEngine {
    config: Arc<ConfigStore>,
    store: Arc<ValidationStore>,
    orchestrator: BatchOrchestrator,
    audit: Arc<dyn AuditSink>,
}

impl ValidationEngine {
    pub fn new(
        defaults: ValidationConfig,
        registry: FieldRegistry,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ValidationError> {
        let config = Arc::new(ConfigStore::new(defaults)?);
        let store = Arc::new(ValidationStore::new());
        let orchestrator = BatchOrchestrator::new(config.clone(), store.clone(), registry, audit.clone());
        Ok(Self {
            config,
            store,
            orchestrator,
            audit,
        })
    }

    /// 默认配置 + 全部内置字段 + tracing 审计
    pub fn with_defaults() -> Result<Self, ValidationError> {
        Self::new(
            ValidationConfig::default(),
            FieldRegistry::standard(),
            Arc::new(TracingAuditSink),
        )
    }

    // ===== 配置 =====

    pub fn config(&self) -> Result<ValidationConfig, ValidationError> {
        self.config.current()
    }

    pub fn update_config(&self, patch: &ValidationConfigPatch) -> Result<ValidationConfig, ValidationError> {
        let config = self.config.update(patch)?;
        audit::emit(self.audit.as_ref(), AuditEvent::ConfigUpdated);
        Ok(config)
    }

    pub fn reset_config(&self) -> Result<ValidationConfig, ValidationError> {
        let config = self.config.reset()?;
        audit::emit(self.audit.as_ref(), AuditEvent::ConfigReset);
        Ok(config)
    }

    // ===== 校验 =====

    pub fn validate_batch(
        &self,
        records: &[InvoiceRecord],
        options: BatchOptions,
    ) -> Result<BatchOutcome, ValidationError> {
        self.orchestrator.validate_batch(records, options)
    }

    pub fn revalidate_records(
        &self,
        record_ids: &[String],
        records: &[InvoiceRecord],
        overrides: Option<&ValidationConfigPatch>,
    ) -> Result<RevalidationOutcome, ValidationError> {
        self.orchestrator.revalidate_records(record_ids, records, overrides)
    }

    pub fn progress(&self, batch_id: &str) -> Option<Progress> {
        self.orchestrator.progress(batch_id)
    }

    pub fn cancel_batch(&self, batch_id: &str) -> bool {
        self.orchestrator.cancel_batch(batch_id)
    }

    // ===== 结果与汇总 =====

    pub fn results(&self) -> Result<Vec<ValidationResult>, ValidationError> {
        self.store.results()
    }

    pub fn results_for_record(&self, record_id: &str) -> Result<Option<Vec<ValidationResult>>, ValidationError> {
        self.store.results_for_record(record_id)
    }

    /// 基于当前全部结果重新计算汇总
    pub fn generate_summary(&self) -> Result<ValidationSummary, ValidationError> {
        self.store.summarize(None, None)
    }

    pub fn clear_results_for_records(&self, record_ids: &[String]) -> Result<MutationStats, ValidationError> {
        let stats = self.store.clear_for_records(record_ids)?;
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::ResultsCleared {
                record_ids: record_ids.to_vec(),
                records_removed: stats.records_removed,
                alerts_removed: stats.alerts_removed,
            },
        );
        Ok(stats)
    }

    // ===== 告警 =====

    pub fn alerts(&self) -> Result<Vec<Alert>, ValidationError> {
        self.store.alerts()
    }

    pub fn unacknowledged_alerts(&self) -> Result<Vec<Alert>, ValidationError> {
        self.store.unacknowledged_alerts()
    }

    /// 确认告警; 不存在的ID为空操作并返回 false
    pub fn acknowledge_alert(&self, alert_id: &str) -> Result<bool, ValidationError> {
        self.store.acknowledge_alert(alert_id, Utc::now())
    }

    pub fn acknowledge_all_alerts(&self) -> Result<usize, ValidationError> {
        let count = self.store.acknowledge_all_alerts(Utc::now())?;
        if count > 0 {
            audit::emit(self.audit.as_ref(), AuditEvent::AlertsAcknowledged { count });
        }
        Ok(count)
    }

    pub fn dismiss_alert(&self, alert_id: &str) -> Result<Option<Alert>, ValidationError> {
        let dismissed = self.store.dismiss_alert(alert_id)?;
        if dismissed.is_some() {
            audit::emit(
                self.audit.as_ref(),
                AuditEvent::AlertDismissed {
                    alert_id: alert_id.to_string(),
                },
            );
        }
        Ok(dismissed)
    }
}
