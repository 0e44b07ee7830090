//! 重试退避策略：指数基数 + 随机抖动，与 I/O 解耦。

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 首次尝试之后的额外尝试次数。
    pub retries: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            min_wait: Duration::from_millis(300),
            max_wait: Duration::from_millis(3_000),
            jitter: Duration::from_millis(700),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// 第 `attempt` 次失败（从 1 开始）后的等待时长；`roll` ∈ [0, 1) 决定抖动量。
    pub fn delay(&self, attempt: u32, roll: f64) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        let base = self
            .min_wait
            .saturating_mul(1u32 << shift)
            .min(self.max_wait.max(self.min_wait));
        let roll = if roll.is_finite() { roll.clamp(0.0, 1.0) } else { 0.0 };
        let jitter_nanos = (self.jitter.as_nanos() as f64 * roll) as u64;
        base + Duration::from_nanos(jitter_nanos)
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.delay(attempt, rand::rng().random::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            retries: 2,
            min_wait: Duration::from_millis(300),
            max_wait: Duration::from_millis(1_000),
            jitter: Duration::from_millis(700),
        }
    }

    #[test]
    fn base_doubles_until_capped() {
        let p = policy();
        assert_eq!(p.delay(1, 0.0), Duration::from_millis(300));
        assert_eq!(p.delay(2, 0.0), Duration::from_millis(600));
        assert_eq!(p.delay(3, 0.0), Duration::from_millis(1_000));
        assert_eq!(p.delay(40, 0.0), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_is_bounded_by_roll() {
        let p = policy();
        assert_eq!(p.delay(1, 0.5), Duration::from_millis(650));
        assert_eq!(p.delay(1, 1.0), Duration::from_millis(1_000));
        assert_eq!(p.delay(1, -3.0), Duration::from_millis(300));
        assert_eq!(p.delay(1, f64::NAN), Duration::from_millis(300));
    }

    #[test]
    fn random_delay_stays_in_window() {
        let p = policy();
        for _ in 0..50 {
            let d = p.next_delay(1);
            assert!(d >= Duration::from_millis(300) && d <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn attempts_include_first_try() {
        assert_eq!(policy().max_attempts(), 3);
        let none = RetryPolicy {
            retries: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(none.max_attempts(), 1);
    }
}
