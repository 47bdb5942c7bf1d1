use thiserror::Error;

/// 校验引擎错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    // ===== 可恢复: 字段/记录级 =====
    #[error("字段计算失败 (record={record_id}, field={field}): {message}")]
    FieldEvaluation {
        record_id: String,
        field: String,
        message: String,
    },

    #[error("记录结构无效 (record={record_id}): 缺少字段 {field}")]
    RecordStructural { record_id: String, field: String },

    // ===== 批次级 =====
    #[error("批次失败 [{code}]: {message}")]
    BatchFatal { code: String, message: String },

    #[error("汇总生成失败: {0}")]
    SummaryGeneration(String),

    // ===== 配置 =====
    #[error("配置无效: {0}")]
    Config(String),

    #[error("结果存储不可用: {0}")]
    StoreUnavailable(String),
}

impl ValidationError {
    pub fn batch_fatal(code: &str, message: impl Into<String>) -> Self {
        ValidationError::BatchFatal {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// 对外暴露的错误码
    pub fn code(&self) -> &str {
        match self {
            ValidationError::FieldEvaluation { .. } => "FIELD_EVALUATION",
            ValidationError::RecordStructural { .. } => "RECORD_STRUCTURAL",
            ValidationError::BatchFatal { code, .. } => code,
            ValidationError::SummaryGeneration(_) => "SUMMARY_GENERATION",
            ValidationError::Config(_) => "INVALID_CONFIG",
            ValidationError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}
