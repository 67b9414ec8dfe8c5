use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

/// 进程级关闭信号
///
/// 内部是一个 `watch<bool>`，与单个通道调度器的停止信号同构：
/// 入口服务、调度控制器、契约监视器各自持有一个接收器，
/// 关闭后才订阅的接收器看到的也是 `true`。
#[derive(Clone)]
pub struct ShutdownManager {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// 触发关闭，重复调用无效果
    pub fn shutdown(&self) {
        let changed = self.tx.send_if_modified(|stopped| !std::mem::replace(stopped, true));
        if changed {
            info!(subscribers = self.tx.receiver_count(), "触发系统关闭");
        } else {
            debug!("关闭已经触发过");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// 等待关闭被触发
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        // 发送端由自身持有，不会提前关闭
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_subscribers_notified() {
        let manager = ShutdownManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.clone().subscribe();

        manager.shutdown();

        assert!(rx1.wait_for(|s| *s).await.is_ok());
        assert!(rx2.wait_for(|s| *s).await.is_ok());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown();
        manager.shutdown();

        let mut rx = manager.subscribe();
        assert!(*rx.borrow());
        let waited = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s)).await;
        assert!(matches!(waited, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn test_wait_returns_after_shutdown_from_clone() {
        let manager = ShutdownManager::new();
        let other = manager.clone();
        let waiting = tokio::spawn(async move { other.wait().await });

        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        manager.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("wait 应在关闭后返回")
            .unwrap();
    }
}
