use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Severity, ValidationResult};

/// 告警 (由 high/critical 级别的校验结果一对一派生)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub result_id: String,
    pub record_id: String,
    pub field: String,
    pub severity: Severity,
    pub message: String,
    pub discrepancy: BigDecimal,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// 从校验结果派生告警, 低级别结果返回 None
    pub fn from_result(result: &ValidationResult) -> Option<Self> {
        if !result.severity.raises_alert() {
            return None;
        }
        Some(Self {
            id: format!("alert-{}", result.id),
            result_id: result.id.clone(),
            record_id: result.record_id.clone(),
            field: result.field.clone(),
            severity: result.severity,
            message: result.message.clone(),
            discrepancy: result.discrepancy.clone(),
            acknowledged: false,
            acknowledged_at: None,
            created_at: result.validated_at,
        })
    }
}
