use crate::models::Progress;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// 批次进度观察者
///
/// 回调在校验循环内同步触发, 实现方不得阻塞。
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

/// 空操作观察者 (不关心进度的调用方)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl ProgressObserver for NoOpObserver {
    fn on_progress(&self, _progress: &Progress) {}
}

/// 基于无界通道的观察者: 发送永不阻塞, 订阅方退订后静默丢弃
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<Progress>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, ProgressSubscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ProgressSubscription { rx })
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, progress: &Progress) {
        if self.tx.send(progress.clone()).is_err() {
            tracing::trace!("Progress subscriber gone, dropping event for batch {}", progress.batch_id);
        }
    }
}

/// 进度订阅端
#[derive(Debug)]
pub struct ProgressSubscription {
    rx: mpsc::UnboundedReceiver<Progress>,
}

impl ProgressSubscription {
    pub async fn recv(&mut self) -> Option<Progress> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Progress> {
        self.rx.try_recv().ok()
    }

    /// 取出当前已缓冲的全部事件
    pub fn drain(&mut self) -> Vec<Progress> {
        let mut events = Vec::new();
        while let Ok(progress) = self.rx.try_recv() {
            events.push(progress);
        }
        events
    }

    /// 显式退订; 之后的事件在发送端被丢弃
    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}

/// 协作式取消令牌, 在记录之间检查
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
