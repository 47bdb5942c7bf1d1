use crate::error::ValidationError;
use crate::models::{
    BatchStatus, InvoiceRecord, Progress, RecordError, RecordErrorKind, ValidationConfig,
    ValidationConfigPatch, ValidationResult, ValidationSummary,
};
use crate::service::audit::{self, AuditEvent, AuditSink};
use crate::service::config_store::{validate_config, ConfigStore};
use crate::service::evaluator::FieldRegistry;
use crate::service::progress::{CancellationToken, NoOpObserver, ProgressObserver};
use crate::service::validator::{self, RecordOutcome};
use crate::store::ResultStore;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexSet;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// 终态批次进度保留时长
const FINISHED_PROGRESS_RETENTION_MINUTES: i64 = 60;

/// 批次调用选项
#[derive(Default, Clone)]
pub struct BatchOptions {
    /// 调用方指定的批次ID (便于另行查询进度或取消), 缺省自动生成
    pub batch_id: Option<String>,
    /// 仅对本次调用生效的配置覆盖
    pub config: Option<ValidationConfigPatch>,
    pub observer: Option<Arc<dyn ProgressObserver>>,
    pub cancel: Option<CancellationToken>,
}

/// 批次校验结果
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub status: BatchStatus,
    pub summary: ValidationSummary,
    pub results: Vec<ValidationResult>,
    pub errors: Vec<RecordError>,
    pub progress: Progress,
}

/// 按记录ID重新校验的结果
#[derive(Debug, Clone)]
pub struct RevalidationOutcome {
    pub batch_id: String,
    pub record_ids: Vec<String>,
    pub results: Vec<ValidationResult>,
    pub errors: Vec<RecordError>,
    /// 替换后整个结果集的汇总
    pub summary: ValidationSummary,
}

/// 单次批次调用内的进度跟踪 (状态机 + 事件投递)
struct BatchTracker<'a> {
    progress: Progress,
    observer: &'a dyn ProgressObserver,
    registry: &'a DashMap<String, Progress>,
    halted: bool,
}

impl<'a> BatchTracker<'a> {
    fn new(
        progress: Progress,
        observer: &'a dyn ProgressObserver,
        registry: &'a DashMap<String, Progress>,
    ) -> Self {
        registry.insert(progress.batch_id.clone(), progress.clone());
        Self {
            progress,
            observer,
            registry,
            halted: false,
        }
    }

    fn publish(&mut self) {
        if self.halted {
            return;
        }
        self.registry
            .insert(self.progress.batch_id.clone(), self.progress.clone());
        self.observer.on_progress(&self.progress);
        // 终态事件之后不再投递
        if self.progress.status.is_terminal() {
            self.halted = true;
        }
    }

    fn advance(&mut self, status: BatchStatus, step: impl Into<String>) {
        if self.progress.advance(status, step, Utc::now()) {
            self.publish();
        }
    }

    fn processed(&mut self, processed: usize) {
        self.progress.record_processed(processed, Utc::now());
        self.progress.current_step = format!(
            "validated {}/{} records",
            self.progress.processed_records, self.progress.total_records
        );
        self.publish();
    }
}

/// 批次编排器
pub struct BatchOrchestrator {
    config: Arc<ConfigStore>,
    store: Arc<dyn ResultStore>,
    registry: FieldRegistry,
    audit: Arc<dyn AuditSink>,
    progress: DashMap<String, Progress>,
    running: DashMap<String, CancellationToken>,
}

impl BatchOrchestrator {
    pub fn new(
        config: Arc<ConfigStore>,
        store: Arc<dyn ResultStore>,
        registry: FieldRegistry,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            audit,
            progress: DashMap::new(),
            running: DashMap::new(),
        }
    }

    /// 本次调用使用的配置: 当前生效配置 + 可选覆盖
    fn resolve_config(&self, overrides: Option<&ValidationConfigPatch>) -> Result<ValidationConfig, ValidationError> {
        let active = self.config.current()?;
        let config = match overrides {
            Some(patch) => active.merged(patch),
            None => active,
        };
        validate_config(&config)?;
        Ok(config)
    }

    /// 批量校验
    ///
    /// 按块并行校验, 每块结果以一次原子替换写入存储并上报一次进度;
    /// 记录级错误收集在结果中, 只有批次级错误才返回 Err。
    /// 同一 batch_id 正在运行时直接拒绝 (BATCH_ALREADY_RUNNING)。
    pub fn validate_batch(
        &self,
        records: &[InvoiceRecord],
        options: BatchOptions,
    ) -> Result<BatchOutcome, ValidationError> {
        self.prune_finished_progress();

        let batch_id = options
            .batch_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let cancel = options.cancel.clone().unwrap_or_default();
        let observer: Arc<dyn ProgressObserver> = options
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoOpObserver));

        match self.running.entry(batch_id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!("[Batch {}] 批次仍在运行, 拒绝重复提交", batch_id);
                return Err(ValidationError::batch_fatal(
                    "BATCH_ALREADY_RUNNING",
                    format!("批次 {} 仍在运行", batch_id),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(cancel.clone());
            }
        }
        let outcome = self.run_batch(&batch_id, records, &options, observer.as_ref(), &cancel);
        self.running.remove(&batch_id);
        outcome
    }

    fn run_batch(
        &self,
        batch_id: &str,
        records: &[InvoiceRecord],
        options: &BatchOptions,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, ValidationError> {
        let started_at = Utc::now();
        let mut tracker = BatchTracker::new(
            Progress::new(batch_id, records.len(), started_at),
            observer,
            &self.progress,
        );

        tracing::info!("[Batch {}] 开始校验, {} 条记录", batch_id, records.len());
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::BatchStarted {
                batch_id: batch_id.to_string(),
                total_records: records.len(),
            },
        );

        // Phase 1: 准备 - 解析配置、整理记录键
        tracker.advance(BatchStatus::Preparing, "resolving configuration");
        let config = match self.resolve_config(options.config.as_ref()) {
            Ok(config) => config,
            Err(e) => return Err(self.fail(&mut tracker, "INVALID_CONFIG", &e.to_string())),
        };

        let mut errors: Vec<RecordError> = Vec::new();
        let prepared = prepare_records(records, &mut errors);

        // Phase 2: 分块校验
        tracker.advance(BatchStatus::Validating, "validating records");
        let chunk_size = config.progress_chunk_size.max(1);
        let mut results: Vec<ValidationResult> = Vec::new();
        let mut validated_ids: Vec<String> = Vec::with_capacity(prepared.len());
        let mut processed = prepared.skipped;
        let mut cancelled = false;

        for chunk in prepared.records.chunks(chunk_size) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let outcomes: Vec<Option<(String, RecordOutcome)>> = chunk
                .par_iter()
                .map(|(key, record)| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some((key.clone(), self.validate_one(key, record, &config, started_at)))
                })
                .collect();

            let (outcomes, interrupted) = committed_prefix(outcomes);
            cancelled |= interrupted;

            let mut entries = Vec::with_capacity(outcomes.len());
            for (key, outcome) in outcomes {
                results.extend(outcome.results.iter().cloned());
                errors.extend(outcome.errors);
                validated_ids.push(key.clone());
                entries.push((key, outcome.results));
            }
            processed += entries.len();

            if let Err(e) = self.store.replace_for_records(&[], entries) {
                return Err(self.fail(&mut tracker, "STORE_UNAVAILABLE", &e.to_string()));
            }

            if cancelled {
                break;
            }
            tracker.processed(processed);
        }

        if cancelled {
            tracker.progress.record_processed(processed, Utc::now());
            tracker.advance(BatchStatus::Cancelled, "cancelled");
            tracing::warn!(
                "[Batch {}] 已取消, 已处理 {}/{} 条记录",
                batch_id, processed, records.len()
            );
        }

        // Phase 3: 汇总
        let summary = match self.store.summarize(Some(&validated_ids), Some(batch_id)) {
            Ok(mut summary) => {
                summary.period_start = Some(started_at);
                summary.period_end = Some(Utc::now());
                summary
            }
            Err(e) => return Err(self.fail(&mut tracker, "SUMMARY_GENERATION", &e.to_string())),
        };

        if !cancelled {
            tracker.advance(BatchStatus::Completed, "completed");
            tracing::info!(
                "[Batch {}] 校验完成 - 记录: {}, 有偏差: {}, 结果: {}, 记录级错误: {}",
                batch_id,
                summary.total_records,
                summary.invalid_records,
                results.len(),
                errors.len()
            );
        }

        audit::emit(
            self.audit.as_ref(),
            AuditEvent::BatchFinished {
                batch_id: batch_id.to_string(),
                status: tracker.progress.status,
                processed_records: tracker.progress.processed_records,
                invalid_records: summary.invalid_records,
                error_count: errors.len(),
            },
        );

        Ok(BatchOutcome {
            batch_id: batch_id.to_string(),
            status: tracker.progress.status,
            summary,
            results,
            errors,
            progress: tracker.progress.clone(),
        })
    }

    fn validate_one(
        &self,
        key: &str,
        record: &InvoiceRecord,
        config: &ValidationConfig,
        validated_at: DateTime<Utc>,
    ) -> RecordOutcome {
        if record.id.trim().is_empty() {
            return validator::structural_outcome(key, "id", validated_at);
        }
        validator::validate_record(record, &self.registry, config, validated_at)
    }

    fn fail(&self, tracker: &mut BatchTracker<'_>, code: &str, message: &str) -> ValidationError {
        let batch_id = tracker.progress.batch_id.clone();
        tracing::error!("[Batch {}] 批次失败 [{}]: {}", batch_id, code, message);
        tracker.advance(BatchStatus::Failed, format!("failed: {}", message));
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::BatchFailed {
                batch_id,
                code: code.to_string(),
                message: message.to_string(),
            },
        );
        ValidationError::batch_fatal(code, message)
    }

    /// 仅重新校验指定记录ID, 结果以一次原子替换写入
    ///
    /// 找不到对应记录的ID: 旧结果被清除并记录 record_not_found 错误。
    pub fn revalidate_records(
        &self,
        record_ids: &[String],
        records: &[InvoiceRecord],
        overrides: Option<&ValidationConfigPatch>,
    ) -> Result<RevalidationOutcome, ValidationError> {
        let batch_id = Uuid::new_v4().to_string();
        let config = self.resolve_config(overrides).map_err(|e| {
            tracing::error!("[Revalidate {}] 配置无效: {}", batch_id, e);
            ValidationError::batch_fatal("INVALID_CONFIG", e.to_string())
        })?;
        let validated_at = Utc::now();

        let ids: IndexSet<String> = record_ids.iter().cloned().collect();
        let mut lookup: HashMap<&str, &InvoiceRecord> = HashMap::with_capacity(records.len());
        for record in records {
            lookup.entry(record.id.as_str()).or_insert(record);
        }

        let mut entries = Vec::with_capacity(ids.len());
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for id in &ids {
            let Some(record) = lookup.get(id.as_str()) else {
                errors.push(RecordError {
                    record_id: id.clone(),
                    field: None,
                    kind: RecordErrorKind::RecordNotFound,
                    message: format!("记录 {} 不在本次提供的记录中", id),
                });
                continue;
            };
            let outcome = validator::validate_record(record, &self.registry, &config, validated_at);
            results.extend(outcome.results.iter().cloned());
            errors.extend(outcome.errors);
            entries.push((id.clone(), outcome.results));
        }

        let written: Vec<(String, usize)> = entries
            .iter()
            .map(|(id, r)| (id.clone(), r.len()))
            .collect();
        let id_list: Vec<String> = ids.into_iter().collect();
        self.store
            .replace_for_records(&id_list, entries)
            .map_err(|e| ValidationError::batch_fatal("STORE_UNAVAILABLE", e.to_string()))?;

        for (record_id, result_count) in written {
            audit::emit(
                self.audit.as_ref(),
                AuditEvent::RecordRevalidated {
                    batch_id: batch_id.clone(),
                    record_id,
                    result_count,
                },
            );
        }
        tracing::info!(
            "[Revalidate {}] 重新校验 {} 条记录, 结果: {}, 错误: {}",
            batch_id,
            id_list.len(),
            results.len(),
            errors.len()
        );

        let summary = self.store.summarize(None, Some(&batch_id))?;
        Ok(RevalidationOutcome {
            batch_id,
            record_ids: id_list,
            results,
            errors,
            summary,
        })
    }

    /// 批次进度快照
    pub fn progress(&self, batch_id: &str) -> Option<Progress> {
        self.progress.get(batch_id).map(|p| p.value().clone())
    }

    /// 请求取消运行中的批次; 批次不存在或已结束时返回 false
    pub fn cancel_batch(&self, batch_id: &str) -> bool {
        match self.running.get(batch_id) {
            Some(token) => {
                token.cancel();
                tracing::info!("[Batch {}] 收到取消请求", batch_id);
                true
            }
            None => false,
        }
    }

    fn prune_finished_progress(&self) {
        let cutoff = Utc::now() - Duration::minutes(FINISHED_PROGRESS_RETENTION_MINUTES);
        self.progress
            .retain(|_, p| !p.status.is_terminal() || p.completed_at.map_or(true, |at| at > cutoff));
    }
}

/// 整理后的批次记录: (记录键, 记录), 首次出现的ID生效
struct PreparedRecords<'a> {
    records: Vec<(String, &'a InvoiceRecord)>,
    skipped: usize,
}

impl PreparedRecords<'_> {
    fn len(&self) -> usize {
        self.records.len()
    }
}

fn prepare_records<'a>(records: &'a [InvoiceRecord], errors: &mut Vec<RecordError>) -> PreparedRecords<'a> {
    let mut seen: IndexSet<String> = IndexSet::with_capacity(records.len());
    let mut prepared = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for (idx, record) in records.iter().enumerate() {
        // 缺少ID的记录以位置作为键
        let key = if record.id.trim().is_empty() {
            format!("row-{}", idx + 1)
        } else {
            record.id.clone()
        };

        if !seen.insert(key.clone()) {
            tracing::warn!("批次内记录ID重复: {} (第 {} 条)", key, idx + 1);
            errors.push(RecordError {
                record_id: key,
                field: None,
                kind: RecordErrorKind::DuplicateRecord,
                message: format!("第 {} 条记录的ID与前面的记录重复, 已跳过", idx + 1),
            });
            skipped += 1;
            continue;
        }
        prepared.push((key, record));
    }

    PreparedRecords {
        records: prepared,
        skipped,
    }
}

/// 取消点之前的连续前缀 (按输入顺序); 第二项表示是否遇到取消
///
/// rayon 各线程完成的记录不一定连续, 只提交首个未执行记录之前的部分。
fn committed_prefix<T>(outcomes: Vec<Option<T>>) -> (Vec<T>, bool) {
    let mut prefix = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Some(value) => prefix.push(value),
            None => return (prefix, true),
        }
    }
    (prefix, false)
}
