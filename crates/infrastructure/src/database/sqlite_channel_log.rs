use async_trait::async_trait;
use chrono::Utc;
use eventing_core::{
    codec, config::ChannelLogConfig, ChannelLog, CloudEvent, EventingError, LogRecord, Result,
};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 基于SQLite的持久化通道日志
///
/// 事件以结构化JSON存储，进程重启后从已提交偏移量继续消费。
/// 读取方按 `poll_interval` 轮询新记录。
pub struct SqliteChannelLog {
    pool: SqlitePool,
    poll_interval: Duration,
}

impl SqliteChannelLog {
    pub fn new(pool: SqlitePool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    /// 按配置建立连接池并初始化表结构
    pub async fn connect(config: &ChannelLogConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.sqlite_url)
            .await?;

        let log = Self::new(pool, config.poll_interval());
        log.migrate().await?;

        info!("SQLite channel log ready: {}", config.sqlite_url);
        Ok(log)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                name TEXT PRIMARY KEY,
                committed_offset INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_events (
                channel TEXT NOT NULL,
                seq INTEGER NOT NULL,
                event BLOB NOT NULL,
                appended_at TEXT NOT NULL,
                PRIMARY KEY (channel, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ensure_exists(&self, channel: &str) -> Result<()> {
        if self.channel_exists(channel).await? {
            Ok(())
        } else {
            Err(EventingError::channel_not_found(channel))
        }
    }

    async fn fetch(
        &self,
        channel: &str,
        from_offset: u64,
        max_records: usize,
    ) -> Result<Vec<LogRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, event FROM channel_events
            WHERE channel = $1 AND seq >= $2
            ORDER BY seq
            LIMIT $3
            "#,
        )
        .bind(channel)
        .bind(from_offset as i64)
        .bind(max_records as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<LogRecord> {
                let seq: i64 = row.try_get("seq")?;
                let bytes: Vec<u8> = row.try_get("event")?;
                Ok(LogRecord {
                    offset: seq as u64,
                    event: codec::from_json_bytes(&bytes)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChannelLog for SqliteChannelLog {
    async fn create_channel(&self, channel: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO channels (name, created_at) VALUES ($1, $2)")
            .bind(channel)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_channel(&self, channel: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM channel_events WHERE channel = $1")
            .bind(channel)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM channels WHERE name = $1")
            .bind(channel)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn channel_exists(&self, channel: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM channels WHERE name = $1")
            .bind(channel)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self, event), fields(channel = %channel, event_id = %event.id()))]
    async fn append(&self, channel: &str, event: &CloudEvent) -> Result<u64> {
        let bytes = codec::to_json_bytes(event)?;

        // 单条语句分配偏移量，SQLite的写锁保证同一通道内连续且唯一
        let row = sqlx::query(
            r#"
            INSERT INTO channel_events (channel, seq, event, appended_at)
            SELECT c.name,
                   (SELECT COALESCE(MAX(seq) + 1, 0) FROM channel_events WHERE channel = c.name),
                   $2,
                   $3
            FROM channels c
            WHERE c.name = $1
            RETURNING seq
            "#,
        )
        .bind(channel)
        .bind(bytes)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| EventingError::channel_not_found(channel))?;

        let seq: i64 = row.try_get("seq")?;
        debug!(offset = seq, "Appended event to SQLite log");
        Ok(seq as u64)
    }

    async fn read(
        &self,
        channel: &str,
        from_offset: u64,
        max_records: usize,
        poll_timeout: Duration,
    ) -> Result<Vec<LogRecord>> {
        let deadline = tokio::time::Instant::now() + poll_timeout;

        loop {
            let records = self.fetch(channel, from_offset, max_records).await?;
            if !records.is_empty() {
                return Ok(records);
            }

            self.ensure_exists(channel).await?;

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn committed_offset(&self, channel: &str) -> Result<u64> {
        let row = sqlx::query("SELECT committed_offset FROM channels WHERE name = $1")
            .bind(channel)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EventingError::channel_not_found(channel))?;

        let offset: i64 = row.try_get("committed_offset")?;
        Ok(offset as u64)
    }

    async fn commit(&self, channel: &str, offset: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE channels SET committed_offset = MAX(committed_offset, $2) WHERE name = $1",
        )
        .bind(channel)
        .bind(offset as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EventingError::channel_not_found(channel));
        }
        Ok(())
    }
}
