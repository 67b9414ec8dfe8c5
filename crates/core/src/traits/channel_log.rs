use std::time::Duration;

use async_trait::async_trait;

use crate::{models::CloudEvent, Result};

/// 日志中的一条记录
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub offset: u64,
    pub event: CloudEvent,
}

/// 通道日志抽象接口
///
/// 每个通道是一个有序、持久、可重放的追加日志，偏移量从0开始连续递增。
/// 追加由入口完成，读取和提交由该通道唯一的调度器完成。
#[async_trait]
pub trait ChannelLog: Send + Sync {
    /// 创建通道，已存在时不做任何事
    async fn create_channel(&self, channel: &str) -> Result<()>;

    /// 删除通道及其全部记录
    async fn delete_channel(&self, channel: &str) -> Result<()>;

    /// 通道是否存在
    async fn channel_exists(&self, channel: &str) -> Result<bool>;

    /// 追加事件，返回持久化后的偏移量
    async fn append(&self, channel: &str, event: &CloudEvent) -> Result<u64>;

    /// 从指定偏移量开始读取最多 `max_records` 条记录
    ///
    /// 没有可读记录时最多等待 `poll_timeout`，超时返回空列表。
    async fn read(
        &self,
        channel: &str,
        from_offset: u64,
        max_records: usize,
        poll_timeout: Duration,
    ) -> Result<Vec<LogRecord>>;

    /// 已提交的偏移量，即下一条待处理记录的偏移量
    async fn committed_offset(&self, channel: &str) -> Result<u64>;

    /// 提交偏移量，表示它之前的记录都已处理完毕
    async fn commit(&self, channel: &str, offset: u64) -> Result<()>;
}
