use std::time::Duration;

use eventing_core::models::{BackoffPolicy, DeliverySpec};

/// 重试决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待给定时长后再次尝试
    RetryAfter(Duration),
    /// 重试次数已用尽
    Exhausted,
}

/// 计算下一次重试
///
/// `failed_attempts` 为目前已失败的尝试次数（从1开始）。
/// 超过 `retry` 次后返回 `Exhausted`，因此一次投递最多尝试 `retry + 1` 次。
pub fn next(failed_attempts: u32, spec: &DeliverySpec) -> RetryDecision {
    if failed_attempts == 0 || failed_attempts > spec.retry {
        return RetryDecision::Exhausted;
    }

    let mut delay = match spec.backoff_policy {
        BackoffPolicy::Linear => spec.backoff_delay.saturating_mul(failed_attempts),
        BackoffPolicy::Exponential => {
            let exponent = (failed_attempts - 1).min(i32::MAX as u32) as i32;
            scale(spec.backoff_delay, spec.backoff_base.powi(exponent))
        }
    };
    if let Some(cap) = spec.backoff_cap {
        delay = delay.min(cap);
    }

    RetryDecision::RetryAfter(delay)
}

/// 按纳秒取整缩放，溢出时饱和
fn scale(delay: Duration, factor: f64) -> Duration {
    let nanos = (delay.as_nanos() as f64 * factor).round();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_attempts_is_exhausted() {
        let spec = DeliverySpec::default().with_retry(3);
        assert_eq!(next(0, &spec), RetryDecision::Exhausted);
    }

    #[test]
    fn test_overflowing_delay_saturates() {
        let spec = DeliverySpec::default()
            .with_retry(5000)
            .with_backoff(BackoffPolicy::Exponential, Duration::from_secs(1));
        assert_eq!(
            next(4000, &spec),
            RetryDecision::RetryAfter(Duration::MAX)
        );
    }
}
