use crate::models::{SeverityThresholds, ValidationConfig};
use bigdecimal::BigDecimal;
use config::{Config, ConfigError, Environment, File};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub validation: ValidationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 启动时的内置校验配置 (键名全部小写下划线, 兼容 config 的键名规范化)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    pub tax_amount_tolerance: BigDecimal,
    pub total_amount_tolerance: BigDecimal,
    pub amount_tolerance: BigDecimal,
    pub threshold_low: BigDecimal,
    pub threshold_medium: BigDecimal,
    pub threshold_high: BigDecimal,
    pub threshold_critical: BigDecimal,
    pub percentage_epsilon: BigDecimal,
    pub progress_chunk_size: usize,
}

impl ValidationSettings {
    pub fn to_validation_config(&self) -> ValidationConfig {
        let mut tolerances = IndexMap::new();
        tolerances.insert("taxAmount".to_string(), self.tax_amount_tolerance.clone());
        tolerances.insert("totalAmount".to_string(), self.total_amount_tolerance.clone());
        tolerances.insert("amount".to_string(), self.amount_tolerance.clone());

        ValidationConfig {
            tolerances,
            thresholds: SeverityThresholds {
                low: self.threshold_low.clone(),
                medium: self.threshold_medium.clone(),
                high: self.threshold_high.clone(),
                critical: self.threshold_critical.clone(),
            },
            percentage_epsilon: self.percentage_epsilon.clone(),
            progress_chunk_size: self.progress_chunk_size,
        }
    }
}

impl From<&ValidationConfig> for ValidationSettings {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            tax_amount_tolerance: config.tolerance_for("taxAmount"),
            total_amount_tolerance: config.tolerance_for("totalAmount"),
            amount_tolerance: config.tolerance_for("amount"),
            threshold_low: config.thresholds.low.clone(),
            threshold_medium: config.thresholds.medium.clone(),
            threshold_high: config.thresholds.high.clone(),
            threshold_critical: config.thresholds.critical.clone(),
            percentage_epsilon: config.percentage_epsilon.clone(),
            progress_chunk_size: config.progress_chunk_size,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            validation: ValidationSettings::from(&ValidationConfig::default()),
        }
    }
}

impl AppConfig {
    /// 加载配置: 内置默认值 → config/app.toml (可选) → TAXVAL__* 环境变量
    ///
    /// 兼容旧的 SERVER_HOST / SERVER_PORT 环境变量, 其优先级最高。
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/app")
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let v = &defaults.validation;

        Config::builder()
            .set_default("server.host", defaults.server.host.clone())?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("validation.tax_amount_tolerance", v.tax_amount_tolerance.to_string())?
            .set_default("validation.total_amount_tolerance", v.total_amount_tolerance.to_string())?
            .set_default("validation.amount_tolerance", v.amount_tolerance.to_string())?
            .set_default("validation.threshold_low", v.threshold_low.to_string())?
            .set_default("validation.threshold_medium", v.threshold_medium.to_string())?
            .set_default("validation.threshold_high", v.threshold_high.to_string())?
            .set_default("validation.threshold_critical", v.threshold_critical.to_string())?
            .set_default("validation.percentage_epsilon", v.percentage_epsilon.to_string())?
            .set_default("validation.progress_chunk_size", v.progress_chunk_size as i64)?
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("TAXVAL").separator("__"))
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .build()?
            .try_deserialize()
    }
}
