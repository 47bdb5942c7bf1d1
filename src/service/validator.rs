use crate::error::ValidationError;
use crate::models::{
    InvoiceRecord, RecordError, RecordErrorKind, Severity, ValidationConfig, ValidationResult,
};
use crate::service::classifier;
use crate::service::evaluator::FieldRegistry;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};

/// 单条记录的校验产出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOutcome {
    pub results: Vec<ValidationResult>,
    pub errors: Vec<RecordError>,
}

impl RecordOutcome {
    pub fn is_valid(&self) -> bool {
        self.results.is_empty()
    }
}

/// 校验单条记录 (纯函数, 不触碰任何共享状态)
///
/// 单字段计算失败只记录错误并继续其他字段; 记录缺少计算必需字段时
/// 只产生一条 critical 级别的合成结果。
pub fn validate_record(
    record: &InvoiceRecord,
    registry: &FieldRegistry,
    config: &ValidationConfig,
    validated_at: DateTime<Utc>,
) -> RecordOutcome {
    if let Some(missing) = record.first_missing_field() {
        return structural_outcome(&record.id, missing, validated_at);
    }

    let mut outcome = RecordOutcome::default();
    for (field, _) in registry.iter() {
        match registry.evaluate(field, record) {
            Ok(Some(eval)) => {
                if let Some(result) = classifier::classify(
                    &record.id,
                    field,
                    &eval.original,
                    &eval.calculated,
                    config,
                    validated_at,
                ) {
                    outcome.results.push(result);
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("Record {}: {}", record.id, err);
                outcome.errors.push(RecordError {
                    record_id: record.id.clone(),
                    field: Some(field.to_string()),
                    kind: RecordErrorKind::FieldEvaluation,
                    message: err.to_string(),
                });
            }
        }
    }
    outcome
}

/// 结构无效记录的产出: 一条 critical 合成结果 + 一条结构错误
pub fn structural_outcome(
    record_id: &str,
    missing: &str,
    validated_at: DateTime<Utc>,
) -> RecordOutcome {
    let err = ValidationError::RecordStructural {
        record_id: record_id.to_string(),
        field: missing.to_string(),
    };
    tracing::warn!("{}", err);

    let result = ValidationResult {
        id: ValidationResult::derive_id(record_id, missing, &validated_at),
        record_id: record_id.to_string(),
        field: missing.to_string(),
        original_value: BigDecimal::zero(),
        calculated_value: BigDecimal::zero(),
        discrepancy: BigDecimal::zero(),
        discrepancy_percentage: None,
        severity: Severity::Critical,
        message: format!("Required field '{}' is missing; record cannot be validated", missing),
        validated_at,
    };

    RecordOutcome {
        results: vec![result],
        errors: vec![RecordError {
            record_id: record_id.to_string(),
            field: Some(missing.to_string()),
            kind: RecordErrorKind::RecordStructural,
            message: err.to_string(),
        }],
    }
}
