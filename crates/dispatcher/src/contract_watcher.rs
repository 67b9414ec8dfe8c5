use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;

use eventing_core::{
    models::{Contract, Subscription},
    EventingError, Result,
};

use crate::contract_store::ContractStore;
use crate::dispatcher::wait_for_shutdown;

/// 控制面下发的数据面契约文件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFile {
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_sink: Option<Url>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl ContractFile {
    pub fn parse(json: &[u8]) -> Result<Self> {
        let file: ContractFile = serde_json::from_slice(json)
            .map_err(|e| EventingError::InvalidContract(format!("解析契约文件失败: {e}")))?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(EventingError::InvalidContract("通道名不能为空".to_string()));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(EventingError::InvalidContract(format!(
                    "重复的通道: {}",
                    channel.name
                )));
            }
            self.contract_for(channel).validate().map_err(|e| {
                EventingError::InvalidContract(format!("通道 {} 的契约无效: {e}", channel.name))
            })?;
        }
        Ok(())
    }

    /// 每个通道的契约，代数取文件代数
    pub fn contracts(&self) -> Vec<(String, Contract)> {
        self.channels
            .iter()
            .map(|channel| (channel.name.clone(), self.contract_for(channel)))
            .collect()
    }

    fn contract_for(&self, channel: &ChannelSpec) -> Contract {
        Contract {
            generation: self.generation,
            dead_letter_sink: channel.dead_letter_sink.clone(),
            subscriptions: channel.subscriptions.clone(),
        }
    }
}

/// 把契约文件应用到存储：更新列出的通道，移除未列出的通道
///
/// 文件代数低于已生效代数时整个文件被忽略，返回是否生效。
pub async fn apply(store: &ContractStore, file: &ContractFile) -> bool {
    store.replace_all(file.generation, file.contracts()).await
}

/// 契约文件监视器
///
/// 按固定间隔检查文件修改时间，变化后重新加载。加载失败时保留之前的契约。
pub struct ContractWatcher {
    path: PathBuf,
    store: Arc<ContractStore>,
    interval: Duration,
    last_modified: Option<SystemTime>,
}

impl ContractWatcher {
    pub fn new(path: impl Into<PathBuf>, store: Arc<ContractStore>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            store,
            interval,
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取并应用契约文件
    pub async fn load(&mut self) -> Result<ContractFile> {
        let modified = self.modified_time().await?;
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            EventingError::Configuration(format!(
                "读取契约文件 {} 失败: {e}",
                self.path.display()
            ))
        })?;
        // 无效文件同样记录修改时间，等下一次修改再重试
        self.last_modified = Some(modified);

        let file = ContractFile::parse(&bytes)?;
        if apply(&self.store, &file).await {
            info!(
                path = %self.path.display(),
                generation = file.generation,
                channels = file.channels.len(),
                "契约文件已加载"
            );
        } else {
            warn!(
                path = %self.path.display(),
                generation = file.generation,
                current_generation = self.store.generation(),
                "契约文件代数过期，保留当前契约"
            );
        }
        Ok(file)
    }

    /// 文件修改时间变化时重新加载，返回是否重新加载
    pub async fn reload_if_changed(&mut self) -> Result<bool> {
        let modified = self.modified_time().await?;
        if self.last_modified == Some(modified) {
            return Ok(false);
        }
        self.load().await?;
        Ok(true)
    }

    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(path = %self.path.display(), "契约文件监视器启动");

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                _ = ticker.tick() => {
                    match self.reload_if_changed().await {
                        Ok(true) => debug!("契约文件变化已应用"),
                        Ok(false) => {}
                        Err(e @ EventingError::InvalidContract(_)) => {
                            error!(error = %e, "契约文件无效，保留当前契约");
                        }
                        Err(e) => warn!(error = %e, "检查契约文件失败"),
                    }
                }
            }
        }

        info!("契约文件监视器已停止");
    }

    async fn modified_time(&self) -> Result<SystemTime> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            EventingError::Configuration(format!(
                "获取契约文件 {} 元数据失败: {e}",
                self.path.display()
            ))
        })?;
        metadata
            .modified()
            .map_err(|e| EventingError::Configuration(format!("获取契约文件修改时间失败: {e}")))
    }
}
