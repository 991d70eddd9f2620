//! 顺序调度时章节之间的节流策略

use async_trait::async_trait;
use rand::Rng;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{PacingConfig, PacingKind};

#[async_trait]
pub trait PacingStrategy: Send + Sync {
    /// 在派发下一个章节前等待，返回实际等待的时长
    async fn wait(&self) -> Duration;

    /// 上一个章节因后端限流而失败
    fn on_throttled(&self) {}

    /// 上一个章节顺利完成
    fn on_success(&self) {}

    fn name(&self) -> &'static str;
}

/// 不等待
pub struct NoPacing;

#[async_trait]
impl PacingStrategy for NoPacing {
    async fn wait(&self) -> Duration {
        Duration::ZERO
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// 固定等待
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl PacingStrategy for FixedDelay {
    async fn wait(&self) -> Duration {
        tokio::time::sleep(self.delay).await;
        self.delay
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// 令牌桶：允许 `capacity` 个章节连续派发，之后每 `refill_every` 补充一个令牌
pub struct TokenBucket {
    capacity: f64,
    refill_every: Duration,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_every,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 取一个令牌，返回需要等待的时长
    fn take(&self) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if self.refill_every.is_zero() {
            bucket.tokens = self.capacity;
        } else {
            let refilled = now.duration_since(bucket.last_refill).as_secs_f64()
                / self.refill_every.as_secs_f64();
            bucket.tokens = (bucket.tokens + refilled).min(self.capacity);
        }
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Duration::ZERO
        } else {
            let missing = 1.0 - bucket.tokens;
            // 等待期间补充的令牌立即被本次消费
            bucket.tokens = 0.0;
            bucket.last_refill = now + self.refill_every.mul_f64(missing);
            self.refill_every.mul_f64(missing)
        }
    }
}

#[async_trait]
impl PacingStrategy for TokenBucket {
    async fn wait(&self) -> Duration {
        let delay = self.take();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }

    fn name(&self) -> &'static str {
        "token_bucket"
    }
}

/// 自适应退避：遇到限流时等待时长翻倍（有上限），成功后逐步回落到基础值
pub struct AdaptiveBackoff {
    base: Duration,
    max: Duration,
    current: Mutex<Duration>,
}

impl AdaptiveBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: Mutex::new(base),
        }
    }

    pub fn current_delay(&self) -> Duration {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        // 仅在退避状态下加入最多10%的抖动，避免多个进程同时重试
        if delay <= self.base {
            return delay;
        }
        let factor = rand::rng().random_range(0.0..0.1);
        (delay + delay.mul_f64(factor)).min(self.max)
    }
}

#[async_trait]
impl PacingStrategy for AdaptiveBackoff {
    async fn wait(&self) -> Duration {
        let delay = self.jittered(self.current_delay());
        tokio::time::sleep(delay).await;
        delay
    }

    fn on_throttled(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = current.saturating_mul(2).min(self.max).max(self.base);
    }

    fn on_success(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = (*current / 2).max(self.base);
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}

pub fn build_pacing(config: &PacingConfig) -> Box<dyn PacingStrategy> {
    let delay = Duration::from_millis(config.delay_ms);
    match config.strategy {
        PacingKind::None => Box::new(NoPacing),
        PacingKind::Fixed => Box::new(FixedDelay::new(delay)),
        PacingKind::TokenBucket => Box::new(TokenBucket::new(config.burst, delay)),
        PacingKind::Adaptive => Box::new(AdaptiveBackoff::new(
            delay,
            Duration::from_millis(config.max_delay_ms),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_sleeps() {
        let pacing = FixedDelay::new(Duration::from_secs(30));
        let start = Instant::now();
        assert_eq!(pacing.wait().await, Duration::from_secs(30));
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_allows_burst_then_waits() {
        let pacing = TokenBucket::new(2, Duration::from_secs(10));
        assert_eq!(pacing.wait().await, Duration::ZERO);
        assert_eq!(pacing.wait().await, Duration::ZERO);
        assert_eq!(pacing.wait().await, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(25)).await;
        // 25秒补充了2个令牌（容量上限为2）
        assert_eq!(pacing.wait().await, Duration::ZERO);
        assert_eq!(pacing.wait().await, Duration::ZERO);
        assert!(pacing.wait().await > Duration::ZERO);
    }

    #[test]
    fn test_adaptive_backoff_doubles_and_decays() {
        let pacing = AdaptiveBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
        pacing.on_throttled();
        assert_eq!(pacing.current_delay(), Duration::from_secs(2));
        pacing.on_throttled();
        pacing.on_throttled();
        assert_eq!(pacing.current_delay(), Duration::from_secs(5));
        pacing.on_success();
        assert_eq!(pacing.current_delay(), Duration::from_millis(2500));
        pacing.on_success();
        pacing.on_success();
        assert_eq!(pacing.current_delay(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_wait_stays_within_cap() {
        let pacing = AdaptiveBackoff::new(Duration::from_secs(1), Duration::from_secs(4));
        assert_eq!(pacing.wait().await, Duration::from_secs(1));
        pacing.on_throttled();
        let waited = pacing.wait().await;
        assert!(waited >= Duration::from_secs(2) && waited <= Duration::from_millis(2200));
    }

    #[test]
    fn test_build_from_config() {
        let mut config = PacingConfig::default();
        for (kind, name) in [
            (PacingKind::None, "none"),
            (PacingKind::Fixed, "fixed"),
            (PacingKind::TokenBucket, "token_bucket"),
            (PacingKind::Adaptive, "adaptive"),
        ] {
            config.strategy = kind;
            assert_eq!(build_pacing(&config).name(), name);
        }
    }
}
