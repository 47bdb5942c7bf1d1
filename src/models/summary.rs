use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 校验汇总统计 (每次从当前结果集重新计算)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub batch_id: Option<String>,
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub low_count: usize,
    pub medium_count: usize,
    pub high_count: usize,
    pub critical_count: usize,
    pub total_discrepancy_amount: BigDecimal,
    pub average_discrepancy: BigDecimal,
    pub max_discrepancy: BigDecimal,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}
