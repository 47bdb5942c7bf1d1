//! 规范结果存储
//!
//! 结果集与告警簿放在同一把读写锁下, 每次变更 (追加、按记录替换、清除)
//! 都在一次写锁内完成, 读方不会看到半完成的更新。

use crate::error::ValidationError;
use crate::models::{Alert, ValidationResult, ValidationSummary};
use crate::service::alerts::AlertBook;
use crate::service::summary;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct StoreState {
    /// 记录ID -> 结果; 空列表表示记录已校验且无偏差
    results: IndexMap<String, Vec<ValidationResult>>,
    alerts: AlertBook,
}

/// 一次替换/清除操作的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationStats {
    pub records_removed: usize,
    pub records_written: usize,
    pub alerts_removed: usize,
    pub alerts_created: usize,
}

#[derive(Debug, Default)]
pub struct ValidationStore {
    state: RwLock<StoreState>,
}

impl ValidationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, ValidationError> {
        self.state
            .read()
            .map_err(|e| ValidationError::StoreUnavailable(format!("读锁获取失败: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, ValidationError> {
        self.state
            .write()
            .map_err(|e| ValidationError::StoreUnavailable(format!("写锁获取失败: {}", e)))
    }

    /// 原子替换: 清除 `record_ids` 及 `entries` 涉及记录的旧结果和告警,
    /// 写入新结果并为 high/critical 结果派生告警
    pub fn replace_for_records(
        &self,
        record_ids: &[String],
        entries: Vec<(String, Vec<ValidationResult>)>,
    ) -> Result<MutationStats, ValidationError> {
        let mut state = self.write()?;
        let mut stats = MutationStats::default();

        let written: HashSet<&str> = entries.iter().map(|(id, _)| id.as_str()).collect();
        let mut touched: HashSet<&str> = record_ids.iter().map(String::as_str).collect();
        touched.extend(written.iter().copied());

        stats.alerts_removed = state.alerts.remove_for_records(&touched);
        for id in record_ids {
            if !written.contains(id.as_str()) && state.results.shift_remove(id).is_some() {
                stats.records_removed += 1;
            }
        }

        for (record_id, results) in &entries {
            stats.alerts_created += state.alerts.derive(results);
            // 已存在的键保持原有位置
            state.results.insert(record_id.clone(), results.clone());
            stats.records_written += 1;
        }

        Ok(stats)
    }

    /// 清除指定记录的全部结果与告警 (同一次写锁内完成)
    pub fn clear_for_records(&self, record_ids: &[String]) -> Result<MutationStats, ValidationError> {
        let mut state = self.write()?;
        let ids: HashSet<&str> = record_ids.iter().map(String::as_str).collect();

        let before = state.results.len();
        state.results.retain(|id, _| !ids.contains(id.as_str()));
        let records_removed = before - state.results.len();
        let alerts_removed = state.alerts.remove_for_records(&ids);

        Ok(MutationStats {
            records_removed,
            alerts_removed,
            ..MutationStats::default()
        })
    }

    /// 全部结果 (按记录登记顺序展开)
    pub fn results(&self) -> Result<Vec<ValidationResult>, ValidationError> {
        let state = self.read()?;
        Ok(state.results.values().flatten().cloned().collect())
    }

    pub fn results_for_record(&self, record_id: &str) -> Result<Option<Vec<ValidationResult>>, ValidationError> {
        let state = self.read()?;
        Ok(state.results.get(record_id).cloned())
    }

    /// 已校验的记录ID
    pub fn record_ids(&self) -> Result<Vec<String>, ValidationError> {
        let state = self.read()?;
        Ok(state.results.keys().cloned().collect())
    }

    /// 在读锁内生成汇总; `scope` 为 None 时覆盖全部记录
    pub fn summarize(
        &self,
        scope: Option<&[String]>,
        batch_id: Option<&str>,
    ) -> Result<ValidationSummary, ValidationError> {
        let state = self.read()?;
        match scope {
            None => summary::generate_summary(&state.results, batch_id),
            Some(ids) => {
                let subset: IndexMap<String, Vec<ValidationResult>> = ids
                    .iter()
                    .filter_map(|id| state.results.get(id).map(|r| (id.clone(), r.clone())))
                    .collect();
                summary::generate_summary(&subset, batch_id)
            }
        }
    }

    pub fn alerts(&self) -> Result<Vec<Alert>, ValidationError> {
        Ok(self.read()?.alerts.alerts())
    }

    pub fn unacknowledged_alerts(&self) -> Result<Vec<Alert>, ValidationError> {
        Ok(self.read()?.alerts.unacknowledged())
    }

    pub fn acknowledge_alert(&self, alert_id: &str, now: DateTime<Utc>) -> Result<bool, ValidationError> {
        Ok(self.write()?.alerts.acknowledge(alert_id, now))
    }

    pub fn acknowledge_all_alerts(&self, now: DateTime<Utc>) -> Result<usize, ValidationError> {
        Ok(self.write()?.alerts.acknowledge_all(now))
    }

    pub fn dismiss_alert(&self, alert_id: &str) -> Result<Option<Alert>, ValidationError> {
        Ok(self.write()?.alerts.dismiss(alert_id))
    }
}

/// 编排器写入结果、生成汇总所依赖的存储操作
pub trait ResultStore: Send + Sync {
    fn replace_for_records(
        &self,
        record_ids: &[String],
        entries: Vec<(String, Vec<ValidationResult>)>,
    ) -> Result<MutationStats, ValidationError>;

    fn summarize(
        &self,
        scope: Option<&[String]>,
        batch_id: Option<&str>,
    ) -> Result<ValidationSummary, ValidationError>;
}

impl ResultStore for ValidationStore {
    fn replace_for_records(
        &self,
        record_ids: &[String],
        entries: Vec<(String, Vec<ValidationResult>)>,
    ) -> Result<MutationStats, ValidationError> {
        ValidationStore::replace_for_records(self, record_ids, entries)
    }

    fn summarize(
        &self,
        scope: Option<&[String]>,
        batch_id: Option<&str>,
    ) -> Result<ValidationSummary, ValidationError> {
        ValidationStore::summarize(self, scope, batch_id)
    }
}
