use bigdecimal::BigDecimal;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tax_validation_rust::models::{
    BatchStatus, InvoiceRecord, Progress, RecordErrorKind, Severity, SeverityThresholds,
    ValidationConfig, ValidationConfigPatch, ValidationResult, ValidationSummary,
};
use tax_validation_rust::service::{
    AuditEvent, AuditSink, BatchOptions, BatchOrchestrator, CancellationToken, ChannelObserver,
    ConfigStore, FieldRegistry, ProgressObserver, TracingAuditSink,
};
use tax_validation_rust::store::{MutationStats, ResultStore, ValidationStore};
use tax_validation_rust::{ValidationEngine, ValidationError};

// ==========================================
// 测试辅助
// ==========================================

fn dec(s: &str) -> BigDecimal {
    s.parse().unwrap()
}

fn record(id: &str, amount: &str, rate: &str, tax: &str, total: &str) -> InvoiceRecord {
    InvoiceRecord {
        id: id.into(),
        invoice_number: format!("INV-{}", id),
        customer_code: "C001".into(),
        amount: Some(dec(amount)),
        tax_rate: Some(dec(rate)),
        tax_amount: Some(dec(tax)),
        total_amount: Some(dec(total)),
        currency: "CNY".into(),
        ..Default::default()
    }
}

fn scenario_config() -> ValidationConfig {
    ValidationConfig {
        thresholds: SeverityThresholds {
            low: dec("2"),
            medium: dec("6"),
            high: dec("12"),
            critical: dec("25"),
        },
        ..ValidationConfig::default()
    }
}

#[derive(Default)]
struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: &AuditEvent) -> Result<(), String> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn engine_with_audit() -> (ValidationEngine, Arc<RecordingAudit>) {
    let audit = Arc::new(RecordingAudit::default());
    let engine = ValidationEngine::new(scenario_config(), FieldRegistry::standard(), audit.clone()).unwrap();
    (engine, audit)
}

fn engine() -> ValidationEngine {
    engine_with_audit().0
}

/// 收到第一条已处理进度后取消批次
struct CancelAfterFirstChunk {
    token: CancellationToken,
    events: Mutex<Vec<Progress>>,
}

impl ProgressObserver for CancelAfterFirstChunk {
    fn on_progress(&self, progress: &Progress) {
        if progress.processed_records > 0 {
            self.token.cancel();
        }
        self.events.lock().unwrap().push(progress.clone());
    }
}

/// 允许前 N 次提交成功, 之后提交失败; 可选让汇总失败
struct FlakyStore {
    inner: Arc<ValidationStore>,
    commits_left: AtomicUsize,
    fail_summary: bool,
}

impl FlakyStore {
    fn new(commits: usize, fail_summary: bool) -> Self {
        Self {
            inner: Arc::new(ValidationStore::new()),
            commits_left: AtomicUsize::new(commits),
            fail_summary,
        }
    }
}

impl ResultStore for FlakyStore {
    fn replace_for_records(
        &self,
        record_ids: &[String],
        entries: Vec<(String, Vec<ValidationResult>)>,
    ) -> Result<MutationStats, ValidationError> {
        if self
            .commits_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            return Err(ValidationError::StoreUnavailable("connection reset".into()));
        }
        self.inner.replace_for_records(record_ids, entries)
    }

    fn summarize(
        &self,
        scope: Option<&[String]>,
        batch_id: Option<&str>,
    ) -> Result<ValidationSummary, ValidationError> {
        if self.fail_summary {
            return Err(ValidationError::SummaryGeneration("result set corrupted".into()));
        }
        self.inner.summarize(scope, batch_id)
    }
}

fn orchestrator_over(store: Arc<FlakyStore>) -> BatchOrchestrator {
    BatchOrchestrator::new(
        Arc::new(ConfigStore::new(scenario_config()).unwrap()),
        store,
        FieldRegistry::standard(),
        Arc::new(TracingAuditSink),
    )
}

/// 在批次运行期间用同一个 batch_id 再提交一次
struct ResubmitSameBatch {
    engine: Arc<ValidationEngine>,
    attempted: AtomicBool,
    rejection: Mutex<Option<ValidationError>>,
}

impl ProgressObserver for ResubmitSameBatch {
    fn on_progress(&self, progress: &Progress) {
        if self.attempted.swap(true, Ordering::SeqCst) {
            return;
        }
        let options = BatchOptions {
            batch_id: Some(progress.batch_id.clone()),
            ..BatchOptions::default()
        };
        let outcome = self
            .engine
            .validate_batch(&[record("intruder", "1000", "10", "140", "1140")], options);
        *self.rejection.lock().unwrap() = outcome.err();
    }
}

fn chunked(size: usize) -> Option<ValidationConfigPatch> {
    Some(ValidationConfigPatch {
        progress_chunk_size: Some(size),
        ..Default::default()
    })
}

// ==========================================
// 场景
// ==========================================

#[test]
fn overstated_tax_is_medium() {
    let engine = engine();
    let outcome = engine
        .validate_batch(&[record("r1", "1000", "10", "110", "1110")], BatchOptions::default())
        .unwrap();

    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].field, "taxAmount");
    assert_eq!(outcome.results[0].calculated_value, dec("100"));
    assert_eq!(outcome.results[0].discrepancy, dec("10"));
    assert_eq!(outcome.results[0].severity, Severity::Medium);
    assert!(engine.alerts().unwrap().is_empty());
}

#[test]
fn consistent_record_counts_as_valid() {
    let engine = engine();
    let outcome = engine
        .validate_batch(&[record("r2", "1000", "10", "100", "1100")], BatchOptions::default())
        .unwrap();

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.summary.total_records, 1);
    assert_eq!(outcome.summary.valid_records, 1);
    assert_eq!(outcome.summary.invalid_records, 0);
}

#[test]
fn batch_summary_counts_critical_and_valid() {
    let engine = engine();
    // 税额 140 vs 100: 偏差 40; 总额 1000 + 140 = 1140 与记录一致
    let records = vec![
        record("r1", "1000", "10", "140", "1140"),
        record("r2", "1000", "10", "100", "1100"),
    ];
    let outcome = engine.validate_batch(&records, BatchOptions::default()).unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.total_records, 2);
    assert_eq!(summary.invalid_records, 1);
    assert_eq!(summary.valid_records, 1);
    assert_eq!(summary.critical_count, 1);
    assert_eq!(summary.total_discrepancy_amount, dec("40"));
    assert_eq!(summary.batch_id.as_deref(), Some(outcome.batch_id.as_str()));

    let alerts = engine.alerts().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].record_id, "r1");
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(engine.generate_summary().unwrap().critical_count, 1);
}

#[test]
fn revalidate_only_touches_requested_ids() {
    let engine = engine();
    let records = vec![
        record("r1", "1000", "10", "140", "1140"),
        record("r2", "1000", "10", "120", "1120"),
    ];
    engine.validate_batch(&records, BatchOptions::default()).unwrap();

    let r2_results = engine.results_for_record("r2").unwrap();
    let r2_alerts: Vec<_> = engine
        .alerts()
        .unwrap()
        .into_iter()
        .filter(|a| a.record_id == "r2")
        .collect();
    assert_eq!(r2_alerts.len(), 1);

    // r1 修正后重新校验
    let corrected = vec![record("r1", "1000", "10", "100", "1100")];
    let outcome = engine
        .revalidate_records(&["r1".to_string()], &corrected, None)
        .unwrap();

    assert!(outcome.results.is_empty());
    assert_eq!(engine.results_for_record("r1").unwrap(), Some(vec![]));
    assert_eq!(engine.results_for_record("r2").unwrap(), r2_results);
    let alerts = engine.alerts().unwrap();
    assert_eq!(alerts, r2_alerts);
    assert_eq!(outcome.summary.invalid_records, 1);
    assert_eq!(outcome.summary.total_records, 2);
}

#[test]
fn acknowledge_nonexistent_alert_is_noop() {
    let engine = engine();
    engine
        .validate_batch(&[record("r1", "1000", "10", "140", "1140")], BatchOptions::default())
        .unwrap();
    let before = engine.alerts().unwrap();

    assert!(!engine.acknowledge_alert("nonexistent").unwrap());
    assert_eq!(engine.alerts().unwrap(), before);
    assert_eq!(engine.unacknowledged_alerts().unwrap().len(), 1);
}

// ==========================================
// 告警生命周期
// ==========================================

#[test]
fn acknowledge_all_then_dismiss() {
    let engine = engine();
    let records = vec![
        record("r1", "1000", "10", "140", "1140"),
        record("r2", "1000", "10", "115", "1115"),
        record("r3", "1000", "10", "103", "1103"),
    ];
    engine.validate_batch(&records, BatchOptions::default()).unwrap();
    assert_eq!(engine.alerts().unwrap().len(), 2);

    assert_eq!(engine.acknowledge_all_alerts().unwrap(), 2);
    assert!(engine.unacknowledged_alerts().unwrap().is_empty());
    let acknowledged = engine.alerts().unwrap();
    assert!(acknowledged.iter().all(|a| a.acknowledged && a.acknowledged_at.is_some()));

    assert_eq!(engine.acknowledge_all_alerts().unwrap(), 0);
    assert_eq!(engine.alerts().unwrap(), acknowledged);

    let target = acknowledged[0].id.clone();
    assert!(engine.dismiss_alert(&target).unwrap().is_some());
    let remaining = engine.alerts().unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining.iter().all(|a| a.id != target));
}

#[test]
fn clear_results_removes_matching_records_and_alerts() {
    let (engine, audit) = engine_with_audit();
    let records = vec![
        record("r1", "1000", "10", "140", "1140"),
        record("r2", "1000", "10", "115", "1115"),
        record("r3", "1000", "10", "100", "1100"),
    ];
    engine.validate_batch(&records, BatchOptions::default()).unwrap();

    let stats = engine
        .clear_results_for_records(&["r1".to_string(), "r3".to_string()])
        .unwrap();
    assert_eq!(stats.records_removed, 2);
    assert_eq!(stats.alerts_removed, 1);

    assert!(engine.results().unwrap().iter().all(|r| r.record_id == "r2"));
    assert!(engine.alerts().unwrap().iter().all(|a| a.record_id == "r2"));
    assert_eq!(engine.generate_summary().unwrap().total_records, 1);

    let events = audit.events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, AuditEvent::ResultsCleared { records_removed: 2, .. })));
}

// ==========================================
// 编排器
// ==========================================

#[test]
fn progress_ends_with_terminal_full_event() {
    let engine = engine();
    let (observer, mut subscription) = ChannelObserver::channel();
    let records: Vec<InvoiceRecord> = (0..5)
        .map(|i| record(&format!("r{}", i), "1000", "10", "100", "1100"))
        .collect();

    let options = BatchOptions {
        config: Some(ValidationConfigPatch {
            progress_chunk_size: Some(2),
            ..Default::default()
        }),
        observer: Some(Arc::new(observer)),
        ..BatchOptions::default()
    };
    let outcome = engine.validate_batch(&records, options).unwrap();

    let events = subscription.drain();
    let statuses: Vec<BatchStatus> = events.iter().map(|p| p.status).collect();
    assert_eq!(statuses.first(), Some(&BatchStatus::Preparing));
    assert!(statuses.contains(&BatchStatus::Validating));

    // 5 条记录, 每 2 条上报一次: 2, 4, 5
    let processed: Vec<usize> = events
        .iter()
        .filter(|p| p.status == BatchStatus::Validating && p.processed_records > 0)
        .map(|p| p.processed_records)
        .collect();
    assert_eq!(processed, vec![2, 4, 5]);

    let last = events.last().unwrap();
    assert_eq!(last.status, BatchStatus::Completed);
    assert_eq!(last.progress_percentage, 100);
    assert_eq!(engine.progress(&outcome.batch_id).unwrap().status, BatchStatus::Completed);
}

#[test]
fn cancellation_stops_between_chunks_and_keeps_committed_results() {
    let engine = engine();
    let token = CancellationToken::new();
    let observer = Arc::new(CancelAfterFirstChunk {
        token: token.clone(),
        events: Mutex::new(Vec::new()),
    });
    let records: Vec<InvoiceRecord> = (0..4)
        .map(|i| record(&format!("r{}", i), "1000", "10", "140", "1140"))
        .collect();

    let options = BatchOptions {
        config: Some(ValidationConfigPatch {
            progress_chunk_size: Some(1),
            ..Default::default()
        }),
        observer: Some(observer.clone()),
        cancel: Some(token),
        ..BatchOptions::default()
    };
    let outcome = engine.validate_batch(&records, options).unwrap();

    assert_eq!(outcome.status, BatchStatus::Cancelled);
    assert_eq!(outcome.progress.processed_records, 1);
    assert_eq!(engine.results().unwrap().len(), 1);
    assert_eq!(engine.alerts().unwrap().len(), 1);

    let events = observer.events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.status, BatchStatus::Cancelled);
    assert_eq!(
        events.iter().filter(|p| p.status.is_terminal()).count(),
        1
    );
}

#[test]
fn invalid_config_fails_batch_without_touching_results() {
    let engine = engine();
    engine
        .validate_batch(&[record("r1", "1000", "10", "140", "1140")], BatchOptions::default())
        .unwrap();
    let before = engine.results().unwrap();

    let mut tolerances = indexmap::IndexMap::new();
    tolerances.insert("freight".to_string(), dec("1"));
    let options = BatchOptions {
        batch_id: Some("bad-batch".into()),
        config: Some(ValidationConfigPatch {
            tolerances: Some(tolerances),
            ..Default::default()
        }),
        ..BatchOptions::default()
    };
    let err = engine
        .validate_batch(&[record("r2", "1000", "10", "100", "1100")], options)
        .unwrap_err();

    assert!(matches!(err, ValidationError::BatchFatal { ref code, .. } if code == "INVALID_CONFIG"));
    assert_eq!(engine.progress("bad-batch").unwrap().status, BatchStatus::Failed);
    assert_eq!(engine.results().unwrap(), before);
}

#[test]
fn cancelled_batch_commits_an_input_prefix() {
    let engine = engine();
    let records: Vec<InvoiceRecord> = (0..4000)
        .map(|i| record(&format!("r{:05}", i), "1000", "10", "140", "1140"))
        .collect();
    let token = CancellationToken::new();
    let options = BatchOptions {
        config: chunked(records.len()),
        cancel: Some(token.clone()),
        ..BatchOptions::default()
    };

    let outcome = std::thread::scope(|s| {
        s.spawn(move || {
            std::thread::sleep(Duration::from_millis(1));
            token.cancel();
        });
        engine.validate_batch(&records, options).unwrap()
    });

    // 无论取消落在何处, 已提交的记录都是输入的前 N 条
    let committed = outcome.progress.processed_records;
    let mut stored: Vec<String> = engine
        .results()
        .unwrap()
        .into_iter()
        .map(|r| r.record_id)
        .collect();
    stored.sort();
    let expected: Vec<String> = records[..committed].iter().map(|r| r.id.clone()).collect();
    assert_eq!(stored, expected);
    assert_eq!(engine.alerts().unwrap().len(), committed);
}

#[test]
fn store_failure_keeps_committed_chunks() {
    let store = Arc::new(FlakyStore::new(1, false));
    let orchestrator = orchestrator_over(store.clone());
    let records: Vec<InvoiceRecord> = (0..4)
        .map(|i| record(&format!("r{}", i), "1000", "10", "140", "1140"))
        .collect();
    let options = BatchOptions {
        batch_id: Some("flaky".into()),
        config: chunked(2),
        ..BatchOptions::default()
    };

    let err = orchestrator.validate_batch(&records, options).unwrap_err();
    assert_eq!(err.code(), "STORE_UNAVAILABLE");

    let progress = orchestrator.progress("flaky").unwrap();
    assert_eq!(progress.status, BatchStatus::Failed);
    assert_eq!(progress.processed_records, 2);

    // 第一块的结果与告警保留, 第二块未写入
    let kept: Vec<String> = store.inner.results().unwrap().into_iter().map(|r| r.record_id).collect();
    assert_eq!(kept, vec!["r0".to_string(), "r1".to_string()]);
    let alerts = store.inner.alerts().unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.record_id == "r0" || a.record_id == "r1"));
}

#[test]
fn summary_failure_fails_batch_but_keeps_results() {
    let store = Arc::new(FlakyStore::new(usize::MAX, true));
    let orchestrator = orchestrator_over(store.clone());
    let records = vec![
        record("r1", "1000", "10", "140", "1140"),
        record("r2", "1000", "10", "100", "1100"),
    ];
    let options = BatchOptions {
        batch_id: Some("no-summary".into()),
        ..BatchOptions::default()
    };

    let err = orchestrator.validate_batch(&records, options).unwrap_err();
    assert_eq!(err.code(), "SUMMARY_GENERATION");
    assert_eq!(orchestrator.progress("no-summary").unwrap().status, BatchStatus::Failed);
    assert_eq!(store.inner.record_ids().unwrap(), vec!["r1".to_string(), "r2".to_string()]);
    assert_eq!(store.inner.alerts().unwrap().len(), 1);
}

#[test]
fn running_batch_id_cannot_be_reused() {
    let engine = Arc::new(engine());
    let observer = Arc::new(ResubmitSameBatch {
        engine: engine.clone(),
        attempted: AtomicBool::new(false),
        rejection: Mutex::new(None),
    });
    let options = BatchOptions {
        batch_id: Some("shared".into()),
        observer: Some(observer.clone()),
        ..BatchOptions::default()
    };

    let outcome = engine
        .validate_batch(&[record("r1", "1000", "10", "100", "1100")], options)
        .unwrap();
    assert_eq!(outcome.status, BatchStatus::Completed);

    let rejection = observer.rejection.lock().unwrap().clone().unwrap();
    assert_eq!(rejection.code(), "BATCH_ALREADY_RUNNING");
    assert!(engine.results_for_record("intruder").unwrap().is_none());
    assert_eq!(engine.progress("shared").unwrap().status, BatchStatus::Completed);

    // 结束后可以复用
    let again = BatchOptions {
        batch_id: Some("shared".into()),
        ..BatchOptions::default()
    };
    assert!(engine
        .validate_batch(&[record("r2", "1000", "10", "100", "1100")], again)
        .is_ok());
}

#[test]
fn record_level_problems_do_not_abort_batch() {
    let engine = engine();
    let mut missing_rate = record("r2", "1000", "10", "100", "1100");
    missing_rate.tax_rate = None;
    let no_id = record("", "1000", "10", "100", "1100");
    let records = vec![
        record("r1", "1000", "10", "100", "1100"),
        missing_rate,
        record("r1", "5", "10", "0", "5"),
        no_id,
    ];

    let outcome = engine.validate_batch(&records, BatchOptions::default()).unwrap();
    assert_eq!(outcome.status, BatchStatus::Completed);

    let kinds: Vec<RecordErrorKind> = outcome.errors.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&RecordErrorKind::RecordStructural));
    assert!(kinds.contains(&RecordErrorKind::DuplicateRecord));

    let structural: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.severity == Severity::Critical)
        .map(|r| (r.record_id.clone(), r.field.clone()))
        .collect();
    assert!(structural.contains(&("r2".to_string(), "taxRate".to_string())));
    assert!(structural.contains(&("row-4".to_string(), "id".to_string())));

    // r1 以第一次出现为准
    assert_eq!(engine.results_for_record("r1").unwrap(), Some(vec![]));
    assert_eq!(outcome.summary.total_records, 3);
    assert_eq!(outcome.summary.invalid_records, 2);
}

#[test]
fn revalidate_unknown_id_clears_and_reports() {
    let engine = engine();
    engine
        .validate_batch(&[record("r1", "1000", "10", "140", "1140")], BatchOptions::default())
        .unwrap();

    let outcome = engine
        .revalidate_records(&["r1".to_string()], &[], None)
        .unwrap();
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].kind, RecordErrorKind::RecordNotFound);
    assert!(engine.results_for_record("r1").unwrap().is_none());
    assert!(engine.alerts().unwrap().is_empty());
}

#[test]
fn revalidation_uses_config_active_at_call_time() {
    let engine = engine();
    let records = vec![record("r1", "1000", "10", "110", "1110")];
    engine.validate_batch(&records, BatchOptions::default()).unwrap();
    assert_eq!(engine.results().unwrap()[0].severity, Severity::Medium);

    engine
        .update_config(&ValidationConfigPatch {
            thresholds: Some(SeverityThresholds {
                low: dec("1"),
                medium: dec("2"),
                high: dec("5"),
                critical: dec("50"),
            }),
            ..Default::default()
        })
        .unwrap();
    engine
        .revalidate_records(&["r1".to_string()], &records, None)
        .unwrap();
    assert_eq!(engine.results().unwrap()[0].severity, Severity::High);
    assert_eq!(engine.alerts().unwrap().len(), 1);

    engine.reset_config().unwrap();
    assert_eq!(engine.config().unwrap(), scenario_config());
}

#[test]
fn concurrent_batches_on_disjoint_ids() {
    let engine = Arc::new(engine());
    let left: Vec<InvoiceRecord> = (0..20)
        .map(|i| record(&format!("a{}", i), "1000", "10", "140", "1140"))
        .collect();
    let right: Vec<InvoiceRecord> = (0..20)
        .map(|i| record(&format!("b{}", i), "1000", "10", "100", "1100"))
        .collect();

    std::thread::scope(|s| {
        let e1 = engine.clone();
        let e2 = engine.clone();
        let l = &left;
        let r = &right;
        s.spawn(move || e1.validate_batch(l, BatchOptions::default()).unwrap());
        s.spawn(move || e2.validate_batch(r, BatchOptions::default()).unwrap());
    });

    let summary = engine.generate_summary().unwrap();
    assert_eq!(summary.total_records, 40);
    assert_eq!(summary.invalid_records, 20);
    assert_eq!(engine.alerts().unwrap().len(), 20);
    assert_eq!(engine.generate_summary().unwrap(), summary);
}

#[test]
fn batch_lifecycle_is_audited() {
    let (engine, audit) = engine_with_audit();
    let outcome = engine
        .validate_batch(&[record("r1", "1000", "10", "100", "1100")], BatchOptions::default())
        .unwrap();

    let events = audit.events.lock().unwrap();
    assert!(matches!(
        events.first(),
        Some(AuditEvent::BatchStarted { total_records: 1, .. })
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        AuditEvent::BatchFinished { batch_id, status: BatchStatus::Completed, .. } if *batch_id == outcome.batch_id
    )));
}
