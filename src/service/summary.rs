use crate::error::ValidationError;
use crate::models::{Severity, ValidationResult, ValidationSummary};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// 从当前结果集重新计算汇总统计
///
/// `entries` 为 记录ID -> 该记录的全部结果; 结果为空的记录视为有效记录。
/// 每次调用都从头计算, 不维护任何增量状态。
pub fn generate_summary(
    entries: &IndexMap<String, Vec<ValidationResult>>,
    batch_id: Option<&str>,
) -> Result<ValidationSummary, ValidationError> {
    let mut invalid_records = 0usize;
    let mut counts = [0usize; 4];
    let mut total = BigDecimal::zero();
    let mut max = BigDecimal::zero();
    let mut result_count = 0usize;
    let mut period: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

    for (record_id, results) in entries {
        if !results.is_empty() {
            invalid_records += 1;
        }
        for result in results {
            check_consistency(record_id, result)?;

            counts[severity_slot(result.severity)] += 1;
            total += &result.discrepancy;
            if result.discrepancy > max {
                max = result.discrepancy.clone();
            }
            result_count += 1;

            period = Some(match period {
                None => (result.validated_at, result.validated_at),
                Some((start, end)) => (start.min(result.validated_at), end.max(result.validated_at)),
            });
        }
    }

    let average = if result_count == 0 {
        BigDecimal::zero()
    } else {
        (total.clone() / BigDecimal::from(result_count as u64)).round(4)
    };

    Ok(ValidationSummary {
        batch_id: batch_id.map(|id| id.to_string()),
        total_records: entries.len(),
        valid_records: entries.len() - invalid_records,
        invalid_records,
        low_count: counts[0],
        medium_count: counts[1],
        high_count: counts[2],
        critical_count: counts[3],
        total_discrepancy_amount: total,
        average_discrepancy: average,
        max_discrepancy: max,
        period_start: period.map(|(start, _)| start),
        period_end: period.map(|(_, end)| end),
    })
}

fn severity_slot(severity: Severity) -> usize {
    match severity {
        Severity::Low => 0,
        Severity::Medium => 1,
        Severity::High => 2,
        Severity::Critical => 3,
    }
}

fn check_consistency(record_id: &str, result: &ValidationResult) -> Result<(), ValidationError> {
    if result.record_id != record_id {
        return Err(ValidationError::SummaryGeneration(format!(
            "结果 {} 属于记录 {}, 却登记在记录 {} 下",
            result.id, result.record_id, record_id
        )));
    }
    if result.discrepancy < BigDecimal::zero() {
        return Err(ValidationError::SummaryGeneration(format!(
            "结果 {} 的偏差为负: {}",
            result.id, result.discrepancy
        )));
    }
    let expected = (&result.calculated_value - &result.original_value).abs();
    if result.discrepancy != expected {
        return Err(ValidationError::SummaryGeneration(format!(
            "结果 {} 的偏差 {} 与 |重算值 − 记录值| = {} 不一致",
            result.id, result.discrepancy, expected
        )));
    }
    Ok(())
}
