use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use eventing_core::{
    config::DispatcherConfig,
    models::{CloudEvent, Contract, Destination, Subscription},
    ChannelLog, EventingError, IngressReceiver,
};
use eventing_infrastructure::MetricsCollector;

use crate::contract_store::ContractStore;
use crate::delivery_client::{DeliveryClient, DeliveryOutcome};
use crate::retry_policy::{self, RetryDecision};

/// 一条事件对一个订阅的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 投递成功，没有需要转发的回复
    Delivered,
    /// 回复已送达回复目的地
    ReplyForwarded,
    /// 原始事件已送达死信接收端
    DeadLettered,
    /// 投递失败且死信不可用
    Dropped,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::ReplyForwarded => "reply_forwarded",
            Self::DeadLettered => "dead_lettered",
            Self::Dropped => "dropped",
        }
    }
}

/// 关闭信号打断了退避等待，事件不提交
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// 带重试的投递结果
enum Delivery {
    Succeeded(Option<CloudEvent>),
    Failed(String),
}

/// 投递目标
#[derive(Clone, Copy)]
enum Target<'a> {
    Http(&'a Url),
    Channel(&'a str),
}

/// 单个通道的调度器
///
/// 按日志顺序逐条处理事件：对快照中的所有订阅并发投递，
/// 全部到达终态后才提交偏移量。
pub struct ChannelDispatcher {
    channel: String,
    log: Arc<dyn ChannelLog>,
    store: Arc<ContractStore>,
    client: Arc<dyn DeliveryClient>,
    ingress: IngressReceiver,
    metrics: MetricsCollector,
    config: DispatcherConfig,
}

impl ChannelDispatcher {
    pub fn new(
        channel: impl Into<String>,
        log: Arc<dyn ChannelLog>,
        store: Arc<ContractStore>,
        client: Arc<dyn DeliveryClient>,
        ingress: IngressReceiver,
        metrics: MetricsCollector,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            channel: channel.into(),
            log,
            store,
            client,
            ingress,
            metrics,
            config,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// 消费循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(channel = %self.channel, "通道调度器启动");

        let Ok(mut next_offset) = self.load_committed_offset(&mut shutdown).await else {
            info!(channel = %self.channel, "通道调度器在启动阶段被停止");
            return;
        };

        'consume: loop {
            if *shutdown.borrow() {
                break;
            }

            let read = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                read = self.log.read(
                    &self.channel,
                    next_offset,
                    self.config.max_poll_records,
                    self.config.poll_timeout(),
                ) => read,
            };

            let records = match read {
                Ok(records) => records,
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "读取通道日志失败，稍后重试");
                    if self.pause(self.config.poll_backoff(), &mut shutdown).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            for record in records {
                if *shutdown.borrow() {
                    break 'consume;
                }

                if self.dispatch_event(&record.event, &shutdown).await.is_err() {
                    info!(
                        channel = %self.channel,
                        offset = record.offset,
                        "事件处理被关闭打断，不提交偏移量"
                    );
                    break 'consume;
                }

                next_offset = record.offset + 1;
                match self.log.commit(&self.channel, next_offset).await {
                    Ok(()) => self.metrics.update_committed_offset(&self.channel, next_offset),
                    Err(e) => {
                        // 提交失败只会导致重启后重复投递
                        error!(channel = %self.channel, offset = next_offset, error = %e, "提交偏移量失败");
                    }
                }
            }
        }

        info!(channel = %self.channel, "通道调度器已停止");
    }

    async fn load_committed_offset(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<u64, Interrupted> {
        loop {
            match self.log.committed_offset(&self.channel).await {
                Ok(offset) => return Ok(offset),
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "读取已提交偏移量失败，稍后重试");
                    self.pause(self.config.poll_backoff(), shutdown).await?;
                }
            }
        }
    }

    /// 把一条事件分发给当前快照中的所有订阅
    ///
    /// 返回每个订阅的结果，顺序与快照中的订阅顺序一致。
    #[instrument(skip(self, event, shutdown), fields(channel = %self.channel, event_id = %event.id()))]
    pub async fn dispatch_event(
        &self,
        event: &CloudEvent,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Vec<DispatchOutcome>, Interrupted> {
        let contract = self.store.snapshot(&self.channel).await;
        let contract: &Contract = &contract;
        let started = Instant::now();

        let deliveries = contract.subscriptions.iter().map(|subscription| {
            let mut shutdown = shutdown.clone();
            async move {
                self.dispatch_to_subscription(event, subscription, contract, &mut shutdown)
                    .await
            }
        });

        let outcomes = join_all(deliveries)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        self.metrics
            .record_event_dispatch_duration(started.elapsed().as_secs_f64());
        debug!(
            subscriptions = outcomes.len(),
            generation = contract.generation,
            "事件分发完成"
        );
        Ok(outcomes)
    }

    async fn dispatch_to_subscription(
        &self,
        event: &CloudEvent,
        subscription: &Subscription,
        contract: &Contract,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<DispatchOutcome, Interrupted> {
        let outcome = self.route(event, subscription, contract, shutdown).await?;
        self.metrics
            .record_dispatch_outcome(&self.channel, &subscription.uid, outcome.as_str());
        Ok(outcome)
    }

    /// 订阅者投递、回复转发与死信的状态机
    async fn route(
        &self,
        event: &CloudEvent,
        subscription: &Subscription,
        contract: &Contract,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<DispatchOutcome, Interrupted> {
        let reply = match &subscription.subscriber {
            Some(subscriber) => {
                match self
                    .deliver(event, Target::Http(subscriber), true, subscription, shutdown)
                    .await?
                {
                    Delivery::Succeeded(reply) => reply,
                    Delivery::Failed(reason) => {
                        return Ok(self.dead_letter(event, subscription, contract, &reason).await)
                    }
                }
            }
            // 没有订阅者时事件本身直接转发到回复目的地
            None => Some(event.clone()),
        };

        let outcome = match (reply, &subscription.reply) {
            (Some(reply), Some(destination)) => {
                let target = match destination {
                    Destination::Uri(uri) => Target::Http(uri),
                    Destination::Channel(channel) => Target::Channel(channel),
                };
                match self.deliver(&reply, target, false, subscription, shutdown).await? {
                    Delivery::Succeeded(_) => DispatchOutcome::ReplyForwarded,
                    Delivery::Failed(reason) => {
                        self.dead_letter(event, subscription, contract, &reason).await
                    }
                }
            }
            (Some(reply), None) => {
                debug!(
                    subscription = %subscription.uid,
                    reply_id = reply.id(),
                    "订阅没有回复目的地，丢弃回复"
                );
                DispatchOutcome::Delivered
            }
            (None, _) => DispatchOutcome::Delivered,
        };

        Ok(outcome)
    }

    /// 按订阅的投递配置反复尝试，直到成功、终止性失败或重试耗尽
    ///
    /// `expects_reply` 为假时目标的响应体被忽略，回复不会再次串联。
    async fn deliver(
        &self,
        event: &CloudEvent,
        target: Target<'_>,
        expects_reply: bool,
        subscription: &Subscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Delivery, Interrupted> {
        let mut failed_attempts = 0u32;

        loop {
            let started = Instant::now();
            let outcome = self.attempt(event, target, subscription).await;
            self.metrics.record_delivery_attempt(
                &self.channel,
                &subscription.uid,
                outcome.kind(),
                started.elapsed().as_secs_f64(),
            );

            let reason = match outcome {
                DeliveryOutcome::DeliveredWithReply(reply) if expects_reply => {
                    return Ok(Delivery::Succeeded(Some(reply)))
                }
                DeliveryOutcome::InvalidReply(_) if !expects_reply => {
                    return Ok(Delivery::Succeeded(None))
                }
                DeliveryOutcome::Delivered | DeliveryOutcome::DeliveredWithReply(_) => {
                    return Ok(Delivery::Succeeded(None))
                }
                DeliveryOutcome::InvalidReply(reason) | DeliveryOutcome::Terminal(reason) => {
                    warn!(
                        channel = %self.channel,
                        subscription = %subscription.uid,
                        event_id = event.id(),
                        reason = %reason,
                        "投递失败，不再重试"
                    );
                    return Ok(Delivery::Failed(reason));
                }
                DeliveryOutcome::Retryable(reason) => reason,
            };

            failed_attempts += 1;
            match retry_policy::next(failed_attempts, &subscription.delivery) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        channel = %self.channel,
                        subscription = %subscription.uid,
                        event_id = event.id(),
                        attempt = failed_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "投递失败，等待重试"
                    );
                    self.metrics.record_retry(&self.channel, &subscription.uid);
                    self.pause(delay, shutdown).await?;
                }
                RetryDecision::Exhausted => {
                    warn!(
                        channel = %self.channel,
                        subscription = %subscription.uid,
                        event_id = event.id(),
                        attempts = failed_attempts,
                        reason = %reason,
                        "重试次数已用尽"
                    );
                    return Ok(Delivery::Failed(format!("retries exhausted: {reason}")));
                }
            }
        }
    }

    async fn attempt(
        &self,
        event: &CloudEvent,
        target: Target<'_>,
        subscription: &Subscription,
    ) -> DeliveryOutcome {
        match target {
            Target::Http(uri) => {
                self.client
                    .attempt(
                        event,
                        uri,
                        subscription.content_mode,
                        subscription.delivery.timeout,
                    )
                    .await
            }
            Target::Channel(channel) => match self.ingress.accept(channel, event.clone()).await {
                Ok(_) => DeliveryOutcome::Delivered,
                Err(e @ EventingError::ChannelNotFound { .. }) => {
                    DeliveryOutcome::Retryable(e.to_string())
                }
                Err(e) if e.is_transient() => DeliveryOutcome::Retryable(e.to_string()),
                Err(e) => DeliveryOutcome::Terminal(e.to_string()),
            },
        }
    }

    /// 把原始事件发送到死信接收端，只尝试一次
    async fn dead_letter(
        &self,
        event: &CloudEvent,
        subscription: &Subscription,
        contract: &Contract,
        reason: &str,
    ) -> DispatchOutcome {
        let Some(sink) = contract.dead_letter_sink_for(subscription) else {
            warn!(
                channel = %self.channel,
                subscription = %subscription.uid,
                event_id = event.id(),
                reason = reason,
                "没有配置死信接收端，事件被丢弃"
            );
            return DispatchOutcome::Dropped;
        };

        let outcome = self
            .client
            .attempt(
                event,
                sink,
                subscription.content_mode,
                subscription.delivery.timeout,
            )
            .await;

        if outcome.is_acknowledged() {
            self.metrics.record_dead_letter(&self.channel, true);
            info!(
                channel = %self.channel,
                subscription = %subscription.uid,
                event_id = event.id(),
                sink = %sink,
                reason = reason,
                "事件已投递到死信接收端"
            );
            DispatchOutcome::DeadLettered
        } else {
            self.metrics.record_dead_letter(&self.channel, false);
            error!(
                channel = %self.channel,
                subscription = %subscription.uid,
                event_id = event.id(),
                sink = %sink,
                reason = reason,
                dead_letter_result = ?outcome,
                "死信投递失败，事件被丢弃"
            );
            DispatchOutcome::Dropped
        }
    }

    /// 等待给定时长，关闭信号到达时提前返回
    async fn pause(
        &self,
        delay: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), Interrupted> {
        if *shutdown.borrow() {
            return Err(Interrupted);
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = wait_for_shutdown(shutdown) => Err(Interrupted),
        }
    }
}

/// 等待关闭信号；发送端已释放时永远不会返回
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}
