use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 发票/红字发票记录 (上游解析后的标准化记录)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub invoice_number: String,
    #[serde(default)]
    pub customer_code: String,
    pub amount: Option<BigDecimal>,          // 不含税金额
    pub tax_rate: Option<BigDecimal>,        // 税率 (百分比, 例如 13 表示 13%)
    pub tax_amount: Option<BigDecimal>,      // 税额
    pub discount_amount: Option<BigDecimal>, // 折扣金额 (缺省为 0)
    pub total_amount: Option<BigDecimal>,    // 价税合计
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// 发票明细行
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    pub quantity: Option<BigDecimal>,
    pub unit_price: Option<BigDecimal>,
    pub amount: Option<BigDecimal>,
}

impl LineItem {
    /// 明细行金额: 优先取 amount, 否则 数量 × 单价
    pub fn line_total(&self) -> Option<BigDecimal> {
        match (&self.amount, &self.quantity, &self.unit_price) {
            (Some(amount), _, _) => Some(amount.clone()),
            (None, Some(qty), Some(price)) => Some(qty * price),
            _ => None,
        }
    }
}

impl InvoiceRecord {
    /// 折扣金额, 缺失时按 0 处理
    pub fn discount_or_zero(&self) -> BigDecimal {
        self.discount_amount.clone().unwrap_or_else(BigDecimal::zero)
    }

    /// 计算所需的第一个缺失字段 (结构性校验)
    pub fn first_missing_field(&self) -> Option<&'static str> {
        if self.id.trim().is_empty() {
            return Some("id");
        }
        if self.amount.is_none() {
            return Some("amount");
        }
        if self.tax_rate.is_none() {
            return Some("taxRate");
        }
        if self.tax_amount.is_none() {
            return Some("taxAmount");
        }
        if self.total_amount.is_none() {
            return Some("totalAmount");
        }
        None
    }
}
