use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use eventing_core::{config::DispatcherConfig, ChannelLog, IngressReceiver};
use eventing_infrastructure::MetricsCollector;

use crate::contract_store::ContractStore;
use crate::delivery_client::DeliveryClient;
use crate::dispatcher::{wait_for_shutdown, ChannelDispatcher};

struct ConsumerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    async fn stop(self, channel: &str) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!(channel = channel, error = %e, "通道调度任务异常退出");
        }
    }
}

/// 通道生命周期控制器
///
/// 跟随契约存储的变化创建和删除通道：新出现的通道先建日志再启动调度器，
/// 消失的通道先停调度器再删除日志。
pub struct DispatcherController {
    log: Arc<dyn ChannelLog>,
    store: Arc<ContractStore>,
    client: Arc<dyn DeliveryClient>,
    ingress: IngressReceiver,
    metrics: MetricsCollector,
    config: DispatcherConfig,
    consumers: Mutex<HashMap<String, ConsumerHandle>>,
}

impl DispatcherController {
    pub fn new(
        log: Arc<dyn ChannelLog>,
        store: Arc<ContractStore>,
        client: Arc<dyn DeliveryClient>,
        metrics: MetricsCollector,
        config: DispatcherConfig,
    ) -> Self {
        let ingress = IngressReceiver::new(log.clone());
        Self {
            log,
            store,
            client,
            ingress,
            metrics,
            config,
            consumers: Mutex::new(HashMap::new()),
        }
    }

    /// 跟随契约变化协调通道，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut changes = self.store.subscribe();
        info!("调度控制器启动");

        self.reconcile().await;

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("调度控制器收到关闭信号");
                    break;
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.reconcile().await;
                }
            }
        }

        self.stop_all().await;
        info!("调度控制器已停止");
    }

    /// 使运行中的通道调度器与契约存储中的通道集合一致
    pub async fn reconcile(&self) {
        let desired: HashSet<String> = self.store.channels().await.into_iter().collect();
        let mut consumers = self.consumers.lock().await;

        let removed: Vec<String> = consumers
            .keys()
            .filter(|channel| !desired.contains(*channel))
            .cloned()
            .collect();
        for channel in removed {
            if let Some(handle) = consumers.remove(&channel) {
                handle.stop(&channel).await;
            }
            match self.log.delete_channel(&channel).await {
                Ok(()) => info!(channel = %channel, "通道已下线"),
                Err(e) => error!(channel = %channel, error = %e, "删除通道日志失败"),
            }
        }

        for channel in desired {
            if let Some(existing) = consumers.get(&channel) {
                if !existing.task.is_finished() {
                    continue;
                }
                warn!(channel = %channel, "通道调度任务已退出，重新启动");
            }

            if let Err(e) = self.log.create_channel(&channel).await {
                error!(channel = %channel, error = %e, "创建通道日志失败");
                continue;
            }

            let handle = self.spawn_consumer(&channel);
            consumers.insert(channel.clone(), handle);
            info!(channel = %channel, "通道已上线");
        }

        self.metrics.update_active_channels(consumers.len());
        debug!(channels = consumers.len(), "通道协调完成");
    }

    fn spawn_consumer(&self, channel: &str) -> ConsumerHandle {
        let (stop, stop_rx) = watch::channel(false);
        let dispatcher = ChannelDispatcher::new(
            channel,
            self.log.clone(),
            self.store.clone(),
            self.client.clone(),
            self.ingress.clone(),
            self.metrics.clone(),
            self.config.clone(),
        );
        let task = tokio::spawn(async move { dispatcher.run(stop_rx).await });
        ConsumerHandle { stop, task }
    }

    /// 停止所有通道调度器，通道日志保留
    pub async fn stop_all(&self) {
        let consumers: Vec<(String, ConsumerHandle)> =
            self.consumers.lock().await.drain().collect();

        for (_, handle) in &consumers {
            let _ = handle.stop.send(true);
        }
        for (channel, handle) in consumers {
            handle.stop(&channel).await;
        }
        self.metrics.update_active_channels(0);
    }

    /// 当前正在运行调度器的通道
    pub async fn running_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.consumers.lock().await.keys().cloned().collect();
        channels.sort();
        channels
    }
}
