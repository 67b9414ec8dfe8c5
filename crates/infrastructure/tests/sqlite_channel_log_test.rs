use std::sync::Arc;
use std::time::Duration;

use eventing_core::config::{ChannelLogBackend, ChannelLogConfig};
use eventing_core::{ChannelLog, CloudEvent, EventingError};
use eventing_infrastructure::{ChannelLogFactory, SqliteChannelLog};
use tempfile::TempDir;

struct TestLog {
    _dir: TempDir,
    config: ChannelLogConfig,
    log: SqliteChannelLog,
}

async fn setup() -> TestLog {
    let dir = tempfile::tempdir().unwrap();
    let config = ChannelLogConfig {
        backend: ChannelLogBackend::Sqlite,
        sqlite_url: format!("sqlite://{}?mode=rwc", dir.path().join("log.db").display()),
        max_connections: 4,
        poll_interval_ms: 10,
    };
    let log = SqliteChannelLog::connect(&config).await.unwrap();
    TestLog {
        _dir: dir,
        config,
        log,
    }
}

fn event(id: &str) -> CloudEvent {
    CloudEvent::builder(id, "/orders", "order.created")
        .data_content_type("application/json")
        .data(format!(r#"{{"id":"{id}"}}"#))
        .extension("tenant", "acme")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_append_and_read_preserves_events() {
    let t = setup().await;
    t.log.create_channel("orders").await.unwrap();

    for i in 0..3 {
        let offset = t.log.append("orders", &event(&i.to_string())).await.unwrap();
        assert_eq!(offset, i);
    }

    let records = t.log.read("orders", 1, 10, Duration::ZERO).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].offset, 1);
    assert_eq!(records[0].event, event("1"));
    assert_eq!(records[1].event.extension("tenant"), Some("acme"));
}

#[tokio::test]
async fn test_channels_are_independent() {
    let t = setup().await;
    t.log.create_channel("a").await.unwrap();
    t.log.create_channel("b").await.unwrap();

    t.log.append("a", &event("a0")).await.unwrap();
    t.log.append("a", &event("a1")).await.unwrap();
    assert_eq!(t.log.append("b", &event("b0")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_channel_errors() {
    let t = setup().await;

    assert!(matches!(
        t.log.append("missing", &event("1")).await,
        Err(EventingError::ChannelNotFound { .. })
    ));
    assert!(matches!(
        t.log.read("missing", 0, 1, Duration::ZERO).await,
        Err(EventingError::ChannelNotFound { .. })
    ));
    assert!(matches!(
        t.log.commit("missing", 1).await,
        Err(EventingError::ChannelNotFound { .. })
    ));
}

#[tokio::test]
async fn test_commit_survives_reopen() {
    let t = setup().await;
    t.log.create_channel("orders").await.unwrap();
    t.log.append("orders", &event("1")).await.unwrap();
    t.log.append("orders", &event("2")).await.unwrap();
    t.log.commit("orders", 1).await.unwrap();
    // 偏移量不会回退
    t.log.commit("orders", 0).await.unwrap();

    let reopened = SqliteChannelLog::connect(&t.config).await.unwrap();
    assert_eq!(reopened.committed_offset("orders").await.unwrap(), 1);
    let records = reopened.read("orders", 1, 10, Duration::ZERO).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event.id(), "2");
}

#[tokio::test]
async fn test_read_polls_until_append() {
    let t = setup().await;
    t.log.create_channel("orders").await.unwrap();
    let log = Arc::new(t.log);

    let reader = {
        let log = log.clone();
        tokio::spawn(async move { log.read("orders", 0, 10, Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    log.append("orders", &event("late")).await.unwrap();

    let records = reader.await.unwrap().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event.id(), "late");
}

#[tokio::test]
async fn test_concurrent_appends_get_unique_offsets() {
    let t = setup().await;
    t.log.create_channel("orders").await.unwrap();
    let log = Arc::new(t.log);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let log = log.clone();
            tokio::spawn(async move { log.append("orders", &event(&i.to_string())).await })
        })
        .collect();

    let mut offsets = Vec::new();
    for handle in handles {
        offsets.push(handle.await.unwrap().unwrap());
    }
    offsets.sort_unstable();
    assert_eq!(offsets, (0..20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_delete_channel_removes_records() {
    let t = setup().await;
    t.log.create_channel("orders").await.unwrap();
    t.log.append("orders", &event("1")).await.unwrap();

    t.log.delete_channel("orders").await.unwrap();
    assert!(!t.log.channel_exists("orders").await.unwrap());

    t.log.create_channel("orders").await.unwrap();
    assert_eq!(t.log.append("orders", &event("2")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_factory_selects_backend() {
    let memory = ChannelLogFactory::create(&ChannelLogConfig::default())
        .await
        .unwrap();
    memory.create_channel("x").await.unwrap();
    assert!(memory.channel_exists("x").await.unwrap());

    let t = setup().await;
    let sqlite = ChannelLogFactory::create(&t.config).await.unwrap();
    assert!(!sqlite.channel_exists("x").await.unwrap());
}
