use crate::error::ValidationError;
use crate::models::InvoiceRecord;
use bigdecimal::{BigDecimal, Zero};
use std::fmt;

/// 单字段计算结果: 记录值 vs 按公式重算值
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEvaluation {
    pub original: BigDecimal,
    pub calculated: BigDecimal,
}

/// 字段计算函数 (纯函数); Ok(None) 表示该记录不适用此字段
pub type EvaluatorFn = fn(&InvoiceRecord) -> Result<Option<FieldEvaluation>, String>;

/// 静态注册的字段计算器, 顺序即校验顺序
const EVALUATORS: &[(&str, EvaluatorFn)] = &[
    ("taxAmount", evaluate_tax_amount as EvaluatorFn),
    ("totalAmount", evaluate_total_amount as EvaluatorFn),
    ("amount", evaluate_line_items_amount as EvaluatorFn),
];

fn require<'a>(value: &'a Option<BigDecimal>, name: &str) -> Result<&'a BigDecimal, String> {
    value.as_ref().ok_or_else(|| format!("缺少字段 {}", name))
}

/// 税额 = 金额 × 税率 / 100
fn evaluate_tax_amount(record: &InvoiceRecord) -> Result<Option<FieldEvaluation>, String> {
    let amount = require(&record.amount, "amount")?;
    let tax_rate = require(&record.tax_rate, "taxRate")?;
    let tax_amount = require(&record.tax_amount, "taxAmount")?;

    if *tax_rate < BigDecimal::zero() {
        return Err(format!("税率不能为负: {}", tax_rate));
    }

    Ok(Some(FieldEvaluation {
        original: tax_amount.clone(),
        calculated: amount * tax_rate / BigDecimal::from(100),
    }))
}

/// 价税合计 = 金额 + 税额 − 折扣
fn evaluate_total_amount(record: &InvoiceRecord) -> Result<Option<FieldEvaluation>, String> {
    let amount = require(&record.amount, "amount")?;
    let tax_amount = require(&record.tax_amount, "taxAmount")?;
    let total_amount = require(&record.total_amount, "totalAmount")?;

    Ok(Some(FieldEvaluation {
        original: total_amount.clone(),
        calculated: amount + tax_amount - record.discount_or_zero(),
    }))
}

/// 金额 = 明细行金额之和; 无明细时不适用
fn evaluate_line_items_amount(record: &InvoiceRecord) -> Result<Option<FieldEvaluation>, String> {
    if record.line_items.is_empty() {
        return Ok(None);
    }
    let amount = require(&record.amount, "amount")?;

    let mut sum = BigDecimal::zero();
    for (idx, item) in record.line_items.iter().enumerate() {
        let Some(line_total) = item.line_total() else {
            return Err(format!("明细行 {} 缺少金额或数量/单价", idx + 1));
        };
        sum += line_total;
    }

    Ok(Some(FieldEvaluation {
        original: amount.clone(),
        calculated: sum,
    }))
}

/// 字段计算器注册表
#[derive(Clone)]
pub struct FieldRegistry {
    fields: Vec<(&'static str, EvaluatorFn)>,
}

impl fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.field_names()).finish()
    }
}

impl FieldRegistry {
    /// 全部内置字段
    pub fn standard() -> Self {
        Self {
            fields: EVALUATORS.to_vec(),
        }
    }

    /// 仅启用指定字段; 未知字段在构建时直接报错
    pub fn with_fields(names: &[&str]) -> Result<Self, ValidationError> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let entry = EVALUATORS
                .iter()
                .find(|(field, _)| field == name)
                .ok_or_else(|| ValidationError::Config(format!("未知字段: {}", name)))?;
            if !fields.iter().any(|(field, _)| field == name) {
                fields.push(*entry);
            }
        }
        Ok(Self { fields })
    }

    pub fn is_known(name: &str) -> bool {
        EVALUATORS.iter().any(|(field, _)| *field == name)
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(field, _)| *field).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, EvaluatorFn)> {
        self.fields.iter()
    }

    /// 按字段名计算; 未注册字段视为该字段的计算失败
    pub fn evaluate(
        &self,
        field: &str,
        record: &InvoiceRecord,
    ) -> Result<Option<FieldEvaluation>, ValidationError> {
        let (_, evaluator) = self
            .fields
            .iter()
            .find(|(name, _)| *name == field)
            .ok_or_else(|| ValidationError::FieldEvaluation {
                record_id: record.id.clone(),
                field: field.to_string(),
                message: "字段未注册".to_string(),
            })?;

        evaluator(record).map_err(|message| ValidationError::FieldEvaluation {
            record_id: record.id.clone(),
            field: field.to_string(),
            message,
        })
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
