use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub enabled: bool,
    /// 每次从通道日志拉取的最大记录数
    pub max_poll_records: usize,
    pub poll_timeout_ms: u64,
    /// 读取日志失败后的等待时间
    pub poll_backoff_ms: u64,
    /// 关闭时等待进行中投递完成的最长时间
    pub shutdown_timeout_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_poll_records: 50,
            poll_timeout_ms: 1000,
            poll_backoff_ms: 200,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_poll_records == 0 {
            return Err(anyhow::anyhow!("单次拉取记录数必须大于0"));
        }

        if self.poll_timeout_ms == 0 {
            return Err(anyhow::anyhow!("拉取超时必须大于0"));
        }

        if self.shutdown_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("关闭超时必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// 订阅未配置超时时使用的请求超时
    pub default_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 30,
            connect_timeout_seconds: 5,
            pool_max_idle_per_host: 32,
            user_agent: format!("eventing-dispatcher/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DeliveryConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("默认投递超时必须大于0"));
        }

        if self.connect_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时必须大于0"));
        }

        if self.user_agent.trim().is_empty() {
            return Err(anyhow::anyhow!("User-Agent不能为空"));
        }

        Ok(())
    }
}
