use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 默认的进度上报粒度 (每处理多少条记录上报一次)
pub const DEFAULT_PROGRESS_CHUNK_SIZE: usize = 50;

/// 严重级别阈值 (各级别的下界金额, 含下界)
///
/// `low` 是 low 级别的名义下界, 只参与阈值顺序校验 (0 ≤ low ≤ medium ≤ high ≤ critical);
/// 超出允许偏差且低于 `medium` 的偏差一律为 low。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub low: BigDecimal,
    pub medium: BigDecimal,
    pub high: BigDecimal,
    pub critical: BigDecimal,
}

/// 校验配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    /// 字段 -> 允许偏差 (偏差不超过该值时不产生结果)
    pub tolerances: IndexMap<String, BigDecimal>,
    pub thresholds: SeverityThresholds,
    /// 偏差百分比分母下限
    pub percentage_epsilon: BigDecimal,
    pub progress_chunk_size: usize,
}

/// 配置的部分更新, 按顶层键整体替换
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfigPatch {
    pub tolerances: Option<IndexMap<String, BigDecimal>>,
    pub thresholds: Option<SeverityThresholds>,
    pub percentage_epsilon: Option<BigDecimal>,
    pub progress_chunk_size: Option<usize>,
}

/// 0.01, 即一个最小货币单位
fn one_cent() -> BigDecimal {
    BigDecimal::from(1) / BigDecimal::from(100)
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let mut tolerances = IndexMap::new();
        tolerances.insert("taxAmount".to_string(), one_cent());
        tolerances.insert("totalAmount".to_string(), one_cent());
        tolerances.insert("amount".to_string(), one_cent());

        Self {
            tolerances,
            thresholds: SeverityThresholds {
                low: BigDecimal::from(1),
                medium: BigDecimal::from(10),
                high: BigDecimal::from(100),
                critical: BigDecimal::from(1000),
            },
            percentage_epsilon: one_cent(),
            progress_chunk_size: DEFAULT_PROGRESS_CHUNK_SIZE,
        }
    }
}

impl ValidationConfig {
    /// 字段允许偏差, 未配置时为 0
    pub fn tolerance_for(&self, field: &str) -> BigDecimal {
        self.tolerances
            .get(field)
            .cloned()
            .unwrap_or_else(|| BigDecimal::from(0))
    }

    /// 按顶层键合并部分更新, 返回新配置 (不修改自身)
    pub fn merged(&self, patch: &ValidationConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(tolerances) = &patch.tolerances {
            next.tolerances = tolerances.clone();
        }
        if let Some(thresholds) = &patch.thresholds {
            next.thresholds = thresholds.clone();
        }
        if let Some(epsilon) = &patch.percentage_epsilon {
            next.percentage_epsilon = epsilon.clone();
        }
        if let Some(chunk) = patch.progress_chunk_size {
            next.progress_chunk_size = chunk;
        }
        next
    }
}
