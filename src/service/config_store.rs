use crate::error::ValidationError;
use crate::models::{ValidationConfig, ValidationConfigPatch};
use crate::service::evaluator::FieldRegistry;
use bigdecimal::{BigDecimal, Zero};
use std::sync::RwLock;

/// 当前生效的校验配置 (单实例, 显式更新/重置)
pub struct ConfigStore {
    defaults: ValidationConfig,
    active: RwLock<ValidationConfig>,
}

impl ConfigStore {
    /// 以给定配置作为内置默认值创建; 配置无效时直接失败
    pub fn new(defaults: ValidationConfig) -> Result<Self, ValidationError> {
        validate_config(&defaults)?;
        Ok(Self {
            active: RwLock::new(defaults.clone()),
            defaults,
        })
    }

    /// 当前配置快照
    pub fn current(&self) -> Result<ValidationConfig, ValidationError> {
        self.active
            .read()
            .map(|config| config.clone())
            .map_err(|e| ValidationError::StoreUnavailable(format!("配置锁获取失败: {}", e)))
    }

    /// 按顶层键合并更新; 合并结果无效时保持原配置不变
    pub fn update(&self, patch: &ValidationConfigPatch) -> Result<ValidationConfig, ValidationError> {
        let mut guard = self
            .active
            .write()
            .map_err(|e| ValidationError::StoreUnavailable(format!("配置锁获取失败: {}", e)))?;
        let next = guard.merged(patch);
        validate_config(&next)?;
        *guard = next.clone();
        tracing::info!(
            "Validation config updated: tolerances={}, thresholds={:?}",
            next.tolerances.len(),
            next.thresholds
        );
        Ok(next)
    }

    /// 恢复内置默认配置
    pub fn reset(&self) -> Result<ValidationConfig, ValidationError> {
        let mut guard = self
            .active
            .write()
            .map_err(|e| ValidationError::StoreUnavailable(format!("配置锁获取失败: {}", e)))?;
        *guard = self.defaults.clone();
        tracing::info!("Validation config reset to defaults");
        Ok(guard.clone())
    }
}

/// 配置合法性检查: 字段已注册、偏差非负、阈值非负且单调不减、分母下限为正
pub fn validate_config(config: &ValidationConfig) -> Result<(), ValidationError> {
    let zero = BigDecimal::zero();

    for (field, tolerance) in &config.tolerances {
        if !FieldRegistry::is_known(field) {
            return Err(ValidationError::Config(format!("未知字段: {}", field)));
        }
        if *tolerance < zero {
            return Err(ValidationError::Config(format!(
                "字段 {} 的允许偏差不能为负: {}",
                field, tolerance
            )));
        }
    }

    let t = &config.thresholds;
    if t.low < zero {
        return Err(ValidationError::Config(format!("low 阈值不能为负: {}", t.low)));
    }
    if !(t.low <= t.medium && t.medium <= t.high && t.high <= t.critical) {
        return Err(ValidationError::Config(format!(
            "阈值必须单调不减: low={}, medium={}, high={}, critical={}",
            t.low, t.medium, t.high, t.critical
        )));
    }

    if config.percentage_epsilon <= zero {
        return Err(ValidationError::Config(format!(
            "percentageEpsilon 必须为正: {}",
            config.percentage_epsilon
        )));
    }
    if config.progress_chunk_size == 0 {
        return Err(ValidationError::Config("progressChunkSize 必须大于 0".to_string()));
    }

    Ok(())
}
