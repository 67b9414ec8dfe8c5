use std::sync::Arc;

use eventing_core::models::{Contract, Subscription};
use eventing_dispatcher::ContractStore;
use url::Url;

fn contract(generation: u64, uids: &[&str]) -> Contract {
    Contract::new(
        generation,
        uids.iter()
            .map(|uid| Subscription::new(*uid, Url::parse("http://svc.local/").unwrap()))
            .collect(),
    )
}

#[tokio::test]
async fn test_unknown_channel_snapshot_is_empty() {
    let store = ContractStore::new();
    let snapshot = store.snapshot("missing").await;
    assert!(snapshot.is_empty());
    assert!(!store.contains("missing").await);
}

#[tokio::test]
async fn test_update_replaces_whole_contract() {
    let store = ContractStore::new();
    assert!(store.update("orders", contract(1, &["a", "b"])).await);

    let before = store.snapshot("orders").await;
    assert!(store.update("orders", contract(2, &["c"])).await);
    let after = store.snapshot("orders").await;

    // 旧快照不受影响
    assert_eq!(before.subscriptions.len(), 2);
    assert_eq!(after.subscriptions.len(), 1);
    assert_eq!(after.subscriptions[0].uid, "c");
}

#[tokio::test]
async fn test_stale_generation_is_ignored() {
    let store = ContractStore::new();
    store.update("orders", contract(5, &["new"])).await;

    assert!(!store.update("orders", contract(4, &["old"])).await);
    assert_eq!(store.snapshot("orders").await.subscriptions[0].uid, "new");

    // 相同代数允许覆盖
    assert!(store.update("orders", contract(5, &["same"])).await);
    assert_eq!(store.snapshot("orders").await.subscriptions[0].uid, "same");
}

#[tokio::test]
async fn test_remove_and_channels() {
    let store = ContractStore::new();
    store.update("b", contract(1, &[])).await;
    store.update("a", contract(1, &[])).await;
    assert_eq!(store.channels().await, vec!["a", "b"]);

    assert!(store.remove("a").await);
    assert!(!store.remove("a").await);
    assert_eq!(store.channels().await, vec!["b"]);
}

#[tokio::test]
async fn test_changes_bump_revision() {
    let store = ContractStore::new();
    let mut changes = store.subscribe();

    store.update("orders", contract(1, &["a"])).await;
    assert!(changes.has_changed().unwrap());
    assert_eq!(*changes.borrow_and_update(), 1);

    // 内容相同的更新不产生通知
    store.update("orders", contract(1, &["a"])).await;
    assert!(!changes.has_changed().unwrap());

    store.remove("orders").await;
    assert_eq!(*changes.borrow_and_update(), 2);
    assert_eq!(store.revision(), 2);
}

#[tokio::test]
async fn test_concurrent_snapshots_are_never_mixed() {
    let store = Arc::new(ContractStore::new());
    store.update("orders", contract(0, &["g0-a", "g0-b"])).await;

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for generation in 1..200u64 {
                let a = format!("g{generation}-a");
                let b = format!("g{generation}-b");
                store
                    .update("orders", contract(generation, &[a.as_str(), b.as_str()]))
                    .await;
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snapshot = store.snapshot("orders").await;
                    let prefix = format!("g{}-", snapshot.generation);
                    assert!(snapshot
                        .subscriptions
                        .iter()
                        .all(|s| s.uid.starts_with(&prefix)));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn test_replace_all_is_one_change() {
    let store = ContractStore::new();
    store.update("old", contract(1, &["x"])).await;
    let mut changes = store.subscribe();
    changes.borrow_and_update();

    let applied = store
        .replace_all(
            2,
            vec![
                ("orders".to_string(), contract(2, &["a"])),
                ("invoices".to_string(), contract(2, &["b"])),
            ],
        )
        .await;

    assert!(applied);
    assert!(changes.has_changed().unwrap());
    changes.borrow_and_update();
    assert_eq!(store.channels().await, vec!["invoices", "orders"]);
    assert_eq!(store.generation(), 2);

    // 相同内容不产生变更
    assert!(
        store
            .replace_all(
                2,
                vec![
                    ("orders".to_string(), contract(2, &["a"])),
                    ("invoices".to_string(), contract(2, &["b"])),
                ],
            )
            .await
    );
    assert!(!changes.has_changed().unwrap());

    assert!(!store.replace_all(1, vec![]).await);
    assert_eq!(store.channels().await.len(), 2);
}
