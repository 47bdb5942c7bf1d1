use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 偏差严重级别 (按偏差金额单调递增)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// 是否需要生成告警
    pub fn raises_alert(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单字段校验结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub id: String,
    pub record_id: String,
    pub field: String,
    pub original_value: BigDecimal,
    pub calculated_value: BigDecimal,
    pub discrepancy: BigDecimal,
    /// 原值为 0 时无定义
    pub discrepancy_percentage: Option<BigDecimal>,
    pub severity: Severity,
    pub message: String,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    /// 结果ID: recordId + field + 时间戳(毫秒)
    pub fn derive_id(record_id: &str, field: &str, validated_at: &DateTime<Utc>) -> String {
        format!("{}-{}-{}", record_id, field, validated_at.timestamp_millis())
    }
}

/// 记录级错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordErrorKind {
    /// 单字段计算失败, 跳过该字段
    FieldEvaluation,
    /// 记录缺少计算必需字段
    RecordStructural,
    /// 同一批次内记录ID重复
    DuplicateRecord,
    /// 重新校验时找不到对应记录
    RecordNotFound,
}

/// 记录级错误 (按 recordId 关联, 不中断批次)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    pub record_id: String,
    pub field: Option<String>,
    pub kind: RecordErrorKind,
    pub message: String,
}
