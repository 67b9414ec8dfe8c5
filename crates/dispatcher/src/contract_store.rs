use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use eventing_core::models::Contract;

/// 通道订阅契约存储
///
/// 每个通道保存一个不可变的 `Arc<Contract>`，更新时整体替换。
/// 调度器每处理一条事件取一次快照，因此同一事件看到的订阅集合总是一致的。
pub struct ContractStore {
    contracts: RwLock<HashMap<String, Arc<Contract>>>,
    /// 已生效的最高代数，通道被移除后仍然保留
    generation: AtomicU64,
    revision: watch::Sender<u64>,
    empty: Arc<Contract>,
}

impl Default for ContractStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            contracts: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            revision,
            empty: Arc::new(Contract::default()),
        }
    }

    /// 获取通道当前契约的快照，未知通道返回空契约
    pub async fn snapshot(&self, channel: &str) -> Arc<Contract> {
        self.contracts
            .read()
            .await
            .get(channel)
            .cloned()
            .unwrap_or_else(|| self.empty.clone())
    }

    /// 原子替换通道契约
    ///
    /// 代数小于当前已存储契约的更新会被忽略，返回是否生效。
    pub async fn update(&self, channel: &str, contract: Contract) -> bool {
        let mut contracts = self.contracts.write().await;

        if let Some(current) = contracts.get(channel) {
            if contract.generation < current.generation {
                warn!(
                    channel = channel,
                    current_generation = current.generation,
                    stale_generation = contract.generation,
                    "忽略过期的契约更新"
                );
                return false;
            }
            if **current == contract {
                debug!(channel = channel, "契约未变化");
                return true;
            }
        }

        info!(
            channel = channel,
            generation = contract.generation,
            subscriptions = contract.subscriptions.len(),
            "更新通道契约"
        );
        self.generation
            .fetch_max(contract.generation, Ordering::AcqRel);
        contracts.insert(channel.to_string(), Arc::new(contract));
        drop(contracts);

        self.bump();
        true
    }

    /// 用完整的通道集合替换存储内容：未列出的通道被移除，列出的通道被更新
    ///
    /// 代数低于已生效的最高代数时整个集合被忽略，返回是否生效。
    /// 替换在同一把写锁内完成，订阅者只会看到替换前或替换后的状态。
    pub async fn replace_all(&self, generation: u64, contracts: Vec<(String, Contract)>) -> bool {
        let mut current = self.contracts.write().await;

        let latest = self.generation.load(Ordering::Acquire);
        if generation < latest {
            warn!(
                current_generation = latest,
                stale_generation = generation,
                "忽略过期的契约集合"
            );
            return false;
        }
        self.generation.store(generation, Ordering::Release);

        let listed: HashSet<String> = contracts.iter().map(|(name, _)| name.clone()).collect();
        let mut changed = false;

        current.retain(|channel, _| {
            let keep = listed.contains(channel);
            if !keep {
                info!(channel = %channel, "移除通道契约");
                changed = true;
            }
            keep
        });

        for (channel, contract) in contracts {
            if current.get(&channel).is_some_and(|existing| **existing == contract) {
                continue;
            }
            info!(
                channel = %channel,
                generation = contract.generation,
                subscriptions = contract.subscriptions.len(),
                "更新通道契约"
            );
            current.insert(channel, Arc::new(contract));
            changed = true;
        }
        drop(current);

        if changed {
            self.bump();
        } else {
            debug!(generation = generation, "契约集合未变化");
        }
        true
    }

    /// 已生效的最高契约代数
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// 移除通道契约，返回通道之前是否存在
    pub async fn remove(&self, channel: &str) -> bool {
        let removed = self.contracts.write().await.remove(channel).is_some();
        if removed {
            info!(channel = channel, "移除通道契约");
            self.bump();
        }
        removed
    }

    /// 当前已知的全部通道
    pub async fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.contracts.read().await.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub async fn contains(&self, channel: &str) -> bool {
        self.contracts.read().await.contains_key(channel)
    }

    /// 订阅变更通知，每次通道集合或契约变化时修订号加一
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
