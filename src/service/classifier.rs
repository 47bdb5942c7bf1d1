use crate::models::{Severity, SeverityThresholds, ValidationConfig, ValidationResult};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};

/// 偏差金额 -> 严重级别
///
/// 阈值为各级别下界 (含下界、不含上界), 恰好落在边界上的值归入更高一级;
/// 低于 low 阈值但超出允许偏差的仍记为 low, 因此分级不读取 `thresholds.low`。
pub fn severity_for(discrepancy: &BigDecimal, thresholds: &SeverityThresholds) -> Severity {
    if *discrepancy >= thresholds.critical {
        Severity::Critical
    } else if *discrepancy >= thresholds.high {
        Severity::High
    } else if *discrepancy >= thresholds.medium {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// 偏差百分比 = 偏差 / max(|原值|, ε) × 100, 原值为 0 时无定义
pub fn discrepancy_percentage(
    discrepancy: &BigDecimal,
    original: &BigDecimal,
    epsilon: &BigDecimal,
) -> Option<BigDecimal> {
    if original.is_zero() {
        return None;
    }
    let magnitude = original.abs();
    let denominator = if magnitude < *epsilon {
        epsilon.clone()
    } else {
        magnitude
    };
    Some((discrepancy * BigDecimal::from(100) / denominator).round(4))
}

/// 比较记录值与重算值; 偏差不超过字段允许偏差时不产生结果
pub fn classify(
    record_id: &str,
    field: &str,
    original: &BigDecimal,
    calculated: &BigDecimal,
    config: &ValidationConfig,
    validated_at: DateTime<Utc>,
) -> Option<ValidationResult> {
    let discrepancy = (calculated - original).abs();
    if discrepancy <= config.tolerance_for(field) {
        return None;
    }

    let severity = severity_for(&discrepancy, &config.thresholds);
    let percentage = discrepancy_percentage(&discrepancy, original, &config.percentage_epsilon);
    let message = match &percentage {
        Some(pct) => format!(
            "{} mismatch: recorded {}, expected {} (difference {}, {}%)",
            field, original, calculated, discrepancy, pct
        ),
        None => format!(
            "{} mismatch: recorded {}, expected {} (difference {})",
            field, original, calculated, discrepancy
        ),
    };

    Some(ValidationResult {
        id: ValidationResult::derive_id(record_id, field, &validated_at),
        record_id: record_id.to_string(),
        field: field.to_string(),
        original_value: original.clone(),
        calculated_value: calculated.clone(),
        discrepancy,
        discrepancy_percentage: percentage,
        severity,
        message,
        validated_at,
    })
}
