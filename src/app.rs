use std::sync::Arc;

use anyhow::{Context, Result};
use eventing_api::{create_app, routes::AppState};
use eventing_core::{AppConfig, ChannelLog, IngressReceiver};
use eventing_dispatcher::{
    ContractStore, ContractWatcher, DeliveryClient, DispatcherController, HttpDeliveryClient,
};
use eventing_infrastructure::{init_metrics, ChannelLogFactory, MetricsCollector, MetricsHandle};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info, warn};

use crate::shutdown::ShutdownManager;

/// 主应用程序：组装通道日志、契约存储、调度控制器和入口服务
pub struct Application {
    config: AppConfig,
    log: Arc<dyn ChannelLog>,
    store: Arc<ContractStore>,
    client: Arc<dyn DeliveryClient>,
    metrics: MetricsCollector,
    metrics_handle: Option<MetricsHandle>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        // Prometheus记录器是进程级全局的，只能安装一次
        let metrics_handle = if config.observability.metrics_enabled {
            Some(init_metrics().context("初始化Prometheus指标失败")?)
        } else {
            None
        };

        let log = ChannelLogFactory::create(&config.log)
            .await
            .context("创建通道日志失败")?;

        let client: Arc<dyn DeliveryClient> = Arc::new(
            HttpDeliveryClient::new(&config.delivery).context("创建投递客户端失败")?,
        );

        Ok(Self {
            config,
            log,
            store: Arc::new(ContractStore::new()),
            client,
            metrics: MetricsCollector::new(),
            metrics_handle,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn contract_store(&self) -> Arc<ContractStore> {
        self.store.clone()
    }

    pub fn channel_log(&self) -> Arc<dyn ChannelLog> {
        self.log.clone()
    }

    /// 绑定入口监听地址，入口未启用时返回 `None`
    pub async fn bind_ingress(&self) -> Result<Option<TcpListener>> {
        if !self.config.ingress.enabled {
            return Ok(None);
        }
        let address = &self.config.ingress.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("绑定入口地址失败: {address}"))?;
        Ok(Some(listener))
    }

    /// 运行应用程序，直到关闭管理器触发关闭且所有组件退出
    pub async fn run(&self, listener: Option<TcpListener>, shutdown: ShutdownManager) -> Result<()> {
        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        if let Some(watcher) = self.load_contract().await? {
            let shutdown_rx = shutdown.subscribe();
            tasks.push(("契约监视器", tokio::spawn(watcher.run(shutdown_rx))));
        }

        if self.config.dispatcher.enabled {
            let controller = Arc::new(DispatcherController::new(
                self.log.clone(),
                self.store.clone(),
                self.client.clone(),
                self.metrics.clone(),
                self.config.dispatcher.clone(),
            ));
            // 入口开始接收前先创建契约中的通道
            controller.reconcile().await;

            let shutdown_rx = shutdown.subscribe();
            tasks.push((
                "调度控制器",
                tokio::spawn(async move { controller.run(shutdown_rx).await }),
            ));
        } else {
            info!("Dispatcher已禁用");
        }

        let serve_result = match listener {
            Some(listener) => self.serve_ingress(listener, &shutdown).await,
            None => {
                info!("入口服务未启用");
                shutdown.wait().await;
                Ok(())
            }
        };

        if let Err(e) = &serve_result {
            error!("入口服务异常退出: {e:#}");
            shutdown.shutdown();
        }

        for (name, task) in tasks {
            if let Err(e) = task.await {
                error!("{name}任务异常结束: {e}");
            }
        }

        info!("所有组件已停止");
        serve_result
    }

    /// 首次加载契约文件，配置了监视间隔时返回监视器
    async fn load_contract(&self) -> Result<Option<ContractWatcher>> {
        let Some(path) = self.config.contract.path.as_deref() else {
            warn!("未配置契约文件，没有任何通道");
            return Ok(None);
        };

        let interval = self.config.contract.watch_interval();
        let mut watcher = ContractWatcher::new(
            path,
            self.store.clone(),
            interval.unwrap_or_default(),
        );
        watcher
            .load()
            .await
            .with_context(|| format!("加载契约文件失败: {path}"))?;

        Ok(interval.map(|_| watcher))
    }

    async fn serve_ingress(&self, listener: TcpListener, shutdown: &ShutdownManager) -> Result<()> {
        let state = AppState {
            ingress: IngressReceiver::new(self.log.clone()),
            metrics: self.metrics.clone(),
            metrics_handle: self.metrics_handle.clone(),
        };
        let app = create_app(
            state,
            &self.config.ingress,
            &self.config.observability.metrics_endpoint,
        );

        let address = listener.local_addr().context("获取入口监听地址失败")?;
        info!("入口服务启动，监听地址: {address}");

        let shutdown = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                info!("入口服务收到关闭信号");
            })
            .await
            .context("入口服务运行失败")?;

        info!("入口服务已停止");
        Ok(())
    }
}
