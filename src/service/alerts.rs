use crate::models::{Alert, ValidationResult};
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;

/// 告警簿: 告警列表 + 未确认索引
///
/// 只在结果存储的写锁内被修改, 因此告警列表与未确认索引始终一致
/// (未确认索引 ⊆ 告警列表)。
#[derive(Debug, Clone, Default)]
pub struct AlertBook {
    alerts: IndexMap<String, Alert>,
    unacknowledged: IndexSet<String>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 high/critical 结果派生未确认告警, 返回新增数量
    pub fn derive(&mut self, results: &[ValidationResult]) -> usize {
        let mut created = 0;
        for result in results {
            let Some(alert) = Alert::from_result(result) else {
                continue;
            };
            self.unacknowledged.insert(alert.id.clone());
            self.alerts.insert(alert.id.clone(), alert);
            created += 1;
        }
        created
    }

    /// 确认单条告警; 不存在的ID为空操作
    ///
    /// 已确认的告警再次确认时保留首次确认时间。
    pub fn acknowledge(&mut self, alert_id: &str, now: DateTime<Utc>) -> bool {
        let Some(alert) = self.alerts.get_mut(alert_id) else {
            tracing::debug!("Acknowledge ignored: alert {} not found", alert_id);
            return false;
        };
        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(now);
        }
        self.unacknowledged.shift_remove(alert_id);
        true
    }

    /// 确认全部未确认告警, 返回本次确认数量 (重复调用返回 0)
    pub fn acknowledge_all(&mut self, now: DateTime<Utc>) -> usize {
        let pending: Vec<String> = self.unacknowledged.drain(..).collect();
        for id in &pending {
            if let Some(alert) = self.alerts.get_mut(id) {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(now);
            }
        }
        pending.len()
    }

    /// 移除单条告警 (同时移出未确认索引)
    pub fn dismiss(&mut self, alert_id: &str) -> Option<Alert> {
        self.unacknowledged.shift_remove(alert_id);
        self.alerts.shift_remove(alert_id)
    }

    /// 移除属于指定记录的全部告警, 返回移除数量
    pub fn remove_for_records(&mut self, record_ids: &HashSet<&str>) -> usize {
        let before = self.alerts.len();
        let unacknowledged = &mut self.unacknowledged;
        self.alerts.retain(|id, alert| {
            if record_ids.contains(alert.record_id.as_str()) {
                unacknowledged.shift_remove(id);
                false
            } else {
                true
            }
        });
        before - self.alerts.len()
    }

    pub fn get(&self, alert_id: &str) -> Option<&Alert> {
        self.alerts.get(alert_id)
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.values().cloned().collect()
    }

    pub fn unacknowledged(&self) -> Vec<Alert> {
        self.unacknowledged
            .iter()
            .filter_map(|id| self.alerts.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.unacknowledged.len()
    }
}
