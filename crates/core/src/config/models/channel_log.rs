use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLogBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLogConfig {
    pub backend: ChannelLogBackend,
    pub sqlite_url: String,
    pub max_connections: u32,
    /// SQLite后端在没有新记录时的轮询间隔
    pub poll_interval_ms: u64,
}

impl Default for ChannelLogConfig {
    fn default() -> Self {
        Self {
            backend: ChannelLogBackend::Memory,
            sqlite_url: "sqlite://eventing.db?mode=rwc".to_string(),
            max_connections: 5,
            poll_interval_ms: 50,
        }
    }
}

impl ChannelLogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == ChannelLogBackend::Sqlite {
            if !self.sqlite_url.starts_with("sqlite:") {
                return Err(anyhow::anyhow!(
                    "SQLite连接串必须以sqlite:开头: {}",
                    self.sqlite_url
                ));
            }

            if self.max_connections == 0 {
                return Err(anyhow::anyhow!("最大连接数必须大于0"));
            }
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        Ok(())
    }
}

/// 订阅契约文件配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractConfig {
    /// 控制面生成的契约文件路径，未配置时只能通过代码更新契约
    pub path: Option<String>,
    /// 文件变更检查间隔，0表示不监听
    pub watch_interval_seconds: u64,
}

impl ContractConfig {
    pub fn watch_interval(&self) -> Option<Duration> {
        (self.watch_interval_seconds > 0).then(|| Duration::from_secs(self.watch_interval_seconds))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            if path.trim().is_empty() {
                return Err(anyhow::anyhow!("契约文件路径不能为空字符串"));
            }
        }
        Ok(())
    }
}
